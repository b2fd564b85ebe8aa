//! In-process `CaseStore` for tests and dry runs.
//!
//! Holds everything behind one mutex and performs the same constraint checks
//! as the SQLite schema, so the conformance suite passes against both.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageError;
use crate::record::{now_rfc3339, Case, CaseState, IdentityKey};
use crate::traits::{require_case_id, CaseStore};

#[derive(Default)]
pub struct MemoryCaseStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    last_id: i64,
    active: BTreeMap<i64, Case>,
    history: BTreeMap<i64, Vec<Case>>,
}

impl MemoryInner {
    /// Both identity pairs of `case` must be free among active cases other
    /// than `case` itself.
    fn check_unique(&self, case: &Case) -> Result<(), StorageError> {
        for key in [case.host_device_key(), case.resource_cluster_key()]
            .into_iter()
            .flatten()
        {
            let holder = self
                .active
                .values()
                .find(|other| other.case_id != case.case_id && holds(other, &key));
            if holder.is_some() {
                return Err(StorageError::DuplicateActiveCase {
                    constraint: key.constraint(),
                    detail: key.to_string(),
                });
            }
        }
        Ok(())
    }

    fn current(&self, case_id: i64) -> Result<&Case, StorageError> {
        self.active.get(&case_id).ok_or(StorageError::CaseNotFound {
            case_id,
            version: None,
        })
    }
}

fn holds(case: &Case, key: &IdentityKey) -> bool {
    match key {
        IdentityKey::HostDevice {
            hostname,
            device_path,
        } => {
            case.hostname.as_ref() == Some(hostname) && case.device_path.as_ref() == Some(device_path)
        }
        IdentityKey::ResourceCluster {
            resource_id,
            cluster_id,
        } => case.resource_id == Some(*resource_id) && case.cluster_id.as_ref() == Some(cluster_id),
    }
}

/// Identity is frozen once any version of the case has left `NEW`, even if
/// an operator has since moved it back.
fn identity_frozen(inner: &MemoryInner, current: &Case) -> bool {
    current.state != CaseState::New
        || current.case_id.is_some_and(|id| {
            inner
                .history
                .get(&id)
                .is_some_and(|versions| versions.iter().any(|v| v.state != CaseState::New))
        })
}

/// Checks shared by `update_active` and `supersede_active`.
fn check_rewrite(inner: &MemoryInner, case: &Case, case_id: i64) -> Result<(), StorageError> {
    let current = inner.current(case_id)?;
    if current.version_number != case.version_number {
        return Err(StorageError::PersistenceConflict {
            case_id,
            expected_version: case.version_number,
        });
    }
    if identity_frozen(inner, current) && current.identity_conflicts_with(case) {
        return Err(StorageError::IdentityImmutable { case_id });
    }
    inner.check_unique(case)
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

fn timestamp() -> Result<String, StorageError> {
    now_rfc3339().map_err(|e| StorageError::Backend(e.to_string()))
}

impl CaseStore for MemoryCaseStore {
    fn insert_case(&self, case: &Case) -> Result<Case, StorageError> {
        case.validate().map_err(StorageError::InvalidRecord)?;
        let mut inner = self.lock()?;
        let case_id = inner.last_id + 1;
        let mut stored = case.clone();
        stored.case_id = Some(case_id);
        stored.version_number = 1;
        stored.active = true;
        stored.recorded_at = Some(timestamp()?);
        inner.check_unique(&stored)?;

        inner.last_id = case_id;
        inner.active.insert(case_id, stored.clone());
        Ok(stored)
    }

    fn load_active(&self, case_id: i64) -> Result<Case, StorageError> {
        let inner = self.lock()?;
        inner.current(case_id).cloned()
    }

    fn load_version(&self, case_id: i64, version_number: i64) -> Result<Case, StorageError> {
        let inner = self.lock()?;
        let active = inner
            .active
            .get(&case_id)
            .filter(|c| c.version_number == version_number);
        let archived = || {
            inner
                .history
                .get(&case_id)
                .and_then(|h| h.iter().find(|c| c.version_number == version_number))
        };
        active
            .or_else(archived)
            .cloned()
            .ok_or(StorageError::CaseNotFound {
                case_id,
                version: Some(version_number),
            })
    }

    fn update_active(&self, case: &Case) -> Result<Case, StorageError> {
        case.validate().map_err(StorageError::InvalidRecord)?;
        let case_id = require_case_id(case)?;
        let mut inner = self.lock()?;
        check_rewrite(&inner, case, case_id)?;

        let mut stored = case.clone();
        stored.active = true;
        stored.recorded_at = Some(timestamp()?);
        inner.active.insert(case_id, stored.clone());
        Ok(stored)
    }

    fn supersede_active(&self, case: &Case) -> Result<Case, StorageError> {
        case.validate().map_err(StorageError::InvalidRecord)?;
        let case_id = require_case_id(case)?;
        let mut inner = self.lock()?;
        check_rewrite(&inner, case, case_id)?;

        let mut next = case.clone();
        next.version_number = case.version_number + 1;
        next.active = true;
        next.recorded_at = Some(timestamp()?);

        let mut previous = inner.current(case_id)?.clone();
        previous.active = false;
        inner.history.entry(case_id).or_default().push(previous);
        inner.active.insert(case_id, next.clone());
        Ok(next)
    }

    fn history(&self, case_id: i64) -> Result<Vec<Case>, StorageError> {
        let inner = self.lock()?;
        inner.current(case_id)?;
        Ok(inner.history.get(&case_id).cloned().unwrap_or_default())
    }

    fn list_active(&self, state_filter: Option<CaseState>) -> Result<Vec<Case>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .active
            .values()
            .filter(|c| state_filter.map_or(true, |s| c.state == s))
            .cloned()
            .collect())
    }

    fn find_active(&self, key: &IdentityKey) -> Result<Option<Case>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.active.values().find(|c| holds(c, key)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_assigned_in_order() {
        let store = MemoryCaseStore::new();
        let a = store
            .insert_case(&Case::open().with_host_device("n1", "sda"))
            .unwrap();
        let b = store
            .insert_case(&Case::open().with_host_device("n1", "sdb"))
            .unwrap();
        assert_eq!(a.case_id, Some(1));
        assert_eq!(b.case_id, Some(2));
    }

    #[test]
    fn rejected_insert_does_not_consume_an_id() {
        let store = MemoryCaseStore::new();
        store
            .insert_case(&Case::open().with_host_device("n1", "sda"))
            .unwrap();
        store
            .insert_case(&Case::open().with_host_device("n1", "sda"))
            .unwrap_err();
        let next = store
            .insert_case(&Case::open().with_host_device("n1", "sdb"))
            .unwrap();
        assert_eq!(next.case_id, Some(2));
    }

    #[test]
    fn history_entries_are_inactive() {
        let store = MemoryCaseStore::new();
        let mut case = store
            .insert_case(&Case::open().with_host_device("n1", "sda"))
            .unwrap();
        case.state = CaseState::NewDetail;
        store.supersede_active(&case).unwrap();
        let history = store.history(case.case_id.unwrap()).unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].active);
        assert_eq!(history[0].state, CaseState::New);
    }
}
