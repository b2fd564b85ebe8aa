//! Load, save and version cases on top of a `CaseStore`.
//!
//! The repository adds the caller-facing rules (a new case needs a complete
//! identity, a saved case needs an id) and maps storage failures onto
//! `CaseError`. Uniqueness is never pre-checked here: the store decides at
//! write time, so two racing creators cannot both win.

use dlc_storage::{normalize_device_path, Case, CaseState, CaseStore, IdentityKey};

use crate::error::CaseError;

/// How `CaseRepository::save` writes a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Overwrite the active row, keeping its version number.
    InPlace,
    /// Archive the active row and write the case as the next version.
    NewVersion,
}

pub struct CaseRepository<S: CaseStore> {
    store: S,
}

impl<S: CaseStore> CaseRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist a brand-new case and return it with its assigned id.
    pub fn create(&self, case: &Case) -> Result<Case, CaseError> {
        if let Some(id) = case.case_id {
            return Err(CaseError::InvalidCase {
                case_id: Some(id),
                reason: "case is already persisted; save it instead".to_string(),
            });
        }
        let mut fresh = case.clone();
        fresh.device_path = fresh.device_path.as_deref().map(normalize_device_path);
        if fresh.identity_key().is_none() {
            return Err(CaseError::IncompleteIdentity { case_id: None });
        }
        let stored = self.store.insert_case(&fresh)?;
        tracing::info!(
            case_id = stored.case_id,
            hostname = stored.hostname.as_deref(),
            device_path = stored.device_path.as_deref(),
            "opened case"
        );
        Ok(stored)
    }

    pub fn load(&self, case_id: i64) -> Result<Case, CaseError> {
        Ok(self.store.load_active(case_id)?)
    }

    pub fn load_version(&self, case_id: i64, version_number: i64) -> Result<Case, CaseError> {
        Ok(self.store.load_version(case_id, version_number)?)
    }

    /// Write an already-persisted case. Returns what the store recorded.
    pub fn save(&self, case: &Case, mode: SaveMode) -> Result<Case, CaseError> {
        let case_id = case.case_id.ok_or_else(|| CaseError::InvalidCase {
            case_id: None,
            reason: "case has never been created".to_string(),
        })?;
        let stored = match mode {
            SaveMode::InPlace => self.store.update_active(case),
            SaveMode::NewVersion => self.store.supersede_active(case),
        }
        .map_err(|e| with_case_id(e.into(), case_id))?;
        tracing::debug!(
            case_id,
            version = stored.version_number,
            state = %stored.state,
            ?mode,
            "saved case"
        );
        Ok(stored)
    }

    pub fn history(&self, case_id: i64) -> Result<Vec<Case>, CaseError> {
        Ok(self.store.history(case_id)?)
    }

    pub fn list_active(&self, state_filter: Option<CaseState>) -> Result<Vec<Case>, CaseError> {
        Ok(self.store.list_active(state_filter)?)
    }

    pub fn find_active(&self, key: &IdentityKey) -> Result<Option<Case>, CaseError> {
        Ok(self.store.find_active(key)?)
    }
}

/// Storage errors do not always know which case they were about.
fn with_case_id(err: CaseError, id: i64) -> CaseError {
    match err {
        CaseError::DuplicateActiveCase {
            case_id: None,
            constraint,
            detail,
        } => CaseError::DuplicateActiveCase {
            case_id: Some(id),
            constraint,
            detail,
        },
        CaseError::InvalidCase {
            case_id: None,
            reason,
        } => CaseError::InvalidCase {
            case_id: Some(id),
            reason,
        },
        other => other,
    }
}
