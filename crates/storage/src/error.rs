use crate::record::IdentityConstraint;

/// All errors that can be returned by a `CaseStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No row for the case (or for the requested version of it).
    #[error("case {case_id}{} not found", version_suffix(.version))]
    CaseNotFound { case_id: i64, version: Option<i64> },

    /// An active case already holds this identity. Raised by the uniqueness
    /// constraint at write time, never by an in-memory pre-check.
    #[error("an active case already holds {constraint}: {detail}")]
    DuplicateActiveCase {
        constraint: IdentityConstraint,
        detail: String,
    },

    /// Optimistic concurrency conflict: the active row is no longer at the
    /// version the writer read, or the target version already exists.
    #[error("persistence conflict on case {case_id}: expected active version {expected_version}")]
    PersistenceConflict { case_id: i64, expected_version: i64 },

    /// An identity field of a case that has left `NEW` was about to change.
    #[error("identity of case {case_id} is immutable once past NEW")]
    IdentityImmutable { case_id: i64 },

    /// The record violates a field constraint, or a stored row could not be
    /// decoded (e.g. an unrecognized state).
    #[error("invalid case record: {0}")]
    InvalidRecord(String),

    /// A backend-specific storage error (DB connection, I/O, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

fn version_suffix(version: &Option<i64>) -> String {
    match version {
        Some(v) => format!(" version {v}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_mentions_version_only_when_given() {
        let latest = StorageError::CaseNotFound {
            case_id: 4,
            version: None,
        };
        assert_eq!(latest.to_string(), "case 4 not found");

        let pinned = StorageError::CaseNotFound {
            case_id: 4,
            version: Some(2),
        };
        assert_eq!(pinned.to_string(), "case 4 version 2 not found");
    }

    #[test]
    fn duplicate_message_names_the_constraint() {
        let err = StorageError::DuplicateActiveCase {
            constraint: IdentityConstraint::HostDevice,
            detail: "node1:sdb".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "an active case already holds (hostname, device_path): node1:sdb"
        );
    }
}
