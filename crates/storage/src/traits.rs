use crate::error::StorageError;
use crate::record::{Case, CaseState, IdentityKey};

/// The storage trait for dlc case backends.
///
/// A `CaseStore` owns the durable layout of cases: one active row per
/// `case_id` plus an append-only history of every superseded version.
///
/// ## Constraint Enforcement
///
/// Every write is checked by the backend itself, never by the caller:
///
/// - at most one active case per `(hostname, device_path)` and per
///   `(resource_id, cluster_id)` → `StorageError::DuplicateActiveCase`
/// - `(case_id, version_number)` unique across active and history rows
/// - identity fields of a case past `NEW` never change → `IdentityImmutable`
/// - field constraints (`Case::validate`) → `InvalidRecord`
///
/// ## Version Checks
///
/// `update_active` and `supersede_active` compare the caller's
/// `version_number` with the stored active version. A mismatch means another
/// writer got there first and returns `StorageError::PersistenceConflict`.
///
/// ## Atomicity
///
/// `supersede_active` archives the old row and installs the new one in a
/// single transaction. A failure at any point leaves both the active row and
/// the history exactly as they were.
pub trait CaseStore: Send + Sync {
    /// Insert a brand-new case.
    ///
    /// Assigns a fresh `case_id` from the identity generator and forces
    /// `version_number = 1`, `active = true`. Returns the stored case.
    fn insert_case(&self, case: &Case) -> Result<Case, StorageError>;

    /// Read the active version of a case.
    ///
    /// Returns `Err(StorageError::CaseNotFound)` if no case has this id.
    fn load_active(&self, case_id: i64) -> Result<Case, StorageError>;

    /// Read one specific version, whether active or archived.
    fn load_version(&self, case_id: i64, version_number: i64) -> Result<Case, StorageError>;

    /// Overwrite the active row in place, keeping its version number.
    fn update_active(&self, case: &Case) -> Result<Case, StorageError>;

    /// Archive the active row and write `case` as the next version.
    ///
    /// Returns the stored case with `version_number` incremented.
    fn supersede_active(&self, case: &Case) -> Result<Case, StorageError>;

    /// All archived versions of a case, oldest first. The active row is not
    /// included.
    fn history(&self, case_id: i64) -> Result<Vec<Case>, StorageError>;

    /// Active cases, optionally restricted to one state, ordered by id.
    fn list_active(&self, state_filter: Option<CaseState>) -> Result<Vec<Case>, StorageError>;

    /// The active case holding `key`, if any.
    fn find_active(&self, key: &IdentityKey) -> Result<Option<Case>, StorageError>;
}

/// Helper shared by the backends: the id a case must carry to be updated.
pub(crate) fn require_case_id(case: &Case) -> Result<i64, StorageError> {
    case.case_id.ok_or_else(|| {
        StorageError::InvalidRecord("case has no case_id; insert it first".to_string())
    })
}
