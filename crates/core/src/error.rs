//! Error taxonomy for case operations.

use dlc_storage::{CaseState, IdentityConstraint, IdentityKey, StorageError};

use crate::collaborators::{AdminAction, AdminError};

/// Every failure a repository, reconciliation, or progression call can
/// report. Variants carry the case id (`None` for a case not yet persisted)
/// and, where relevant, the state and attempted target.
#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    #[error("case {case_id}{} not found", version_suffix(.version))]
    CaseNotFound { case_id: i64, version: Option<i64> },

    /// Neither `(hostname, device_path)` nor `(resource_id, cluster_id)` is
    /// complete.
    #[error("{}: no complete identity pair", label(.case_id))]
    IncompleteIdentity { case_id: Option<i64> },

    #[error("{}: transition {from} -> {to} is not allowed", label(.case_id))]
    InvalidTransition {
        case_id: Option<i64>,
        from: CaseState,
        to: CaseState,
    },

    #[error("{}: an active case already holds {constraint}: {detail}", label(.case_id))]
    DuplicateActiveCase {
        case_id: Option<i64>,
        constraint: IdentityConstraint,
        detail: String,
    },

    #[error("{}: inventory has no resource for {key}", label(.case_id))]
    ResourceNotResolved { case_id: Option<i64>, key: IdentityKey },

    #[error(
        "{}: belongs to host {}, this host is {expected}",
        label(.case_id),
        .actual.as_deref().unwrap_or("<unset>")
    )]
    HostAffinityViolation {
        case_id: Option<i64>,
        expected: String,
        actual: Option<String>,
    },

    #[error("{}: recorded host serial {recorded}, this host reports {actual}", label(.case_id))]
    HostSerialMismatch {
        case_id: Option<i64>,
        recorded: String,
        actual: String,
    },

    #[error(
        "{}: belongs to cluster {}, this host serves {expected}",
        label(.case_id),
        .actual.as_deref().unwrap_or("<unset>")
    )]
    ClusterAffinityViolation {
        case_id: Option<i64>,
        expected: String,
        actual: Option<String>,
    },

    /// An admin action failed after identity was confirmed. The case has
    /// already been escalated to `OPERATOR_NEEDED` when this is returned.
    #[error("case {case_id}: {action} failed in {state}, escalated to OPERATOR_NEEDED")]
    AdminActionFailed {
        case_id: i64,
        state: CaseState,
        action: AdminAction,
        #[source]
        source: AdminError,
    },

    #[error("case {case_id}: persistence conflict, expected active version {expected_version}")]
    PersistenceConflict { case_id: i64, expected_version: i64 },

    /// A set identity field would change on a case past `NEW`.
    #[error("{}: identity changed ({detail})", label(.case_id))]
    IdentityChanged { case_id: Option<i64>, detail: String },

    #[error("{}: invalid case: {reason}", label(.case_id))]
    InvalidCase { case_id: Option<i64>, reason: String },

    #[error("{}: {service} error: {message}", label(.case_id))]
    Collaborator {
        case_id: Option<i64>,
        service: &'static str,
        message: String,
    },

    /// Unrecoverable storage failure (connection, I/O, schema).
    #[error("store error: {0}")]
    Store(String),
}

impl CaseError {
    /// The case this error is about, if it has been persisted.
    pub fn case_id(&self) -> Option<i64> {
        match self {
            CaseError::CaseNotFound { case_id, .. }
            | CaseError::AdminActionFailed { case_id, .. }
            | CaseError::PersistenceConflict { case_id, .. } => Some(*case_id),
            CaseError::IncompleteIdentity { case_id }
            | CaseError::InvalidTransition { case_id, .. }
            | CaseError::DuplicateActiveCase { case_id, .. }
            | CaseError::ResourceNotResolved { case_id, .. }
            | CaseError::HostAffinityViolation { case_id, .. }
            | CaseError::HostSerialMismatch { case_id, .. }
            | CaseError::ClusterAffinityViolation { case_id, .. }
            | CaseError::IdentityChanged { case_id, .. }
            | CaseError::InvalidCase { case_id, .. }
            | CaseError::Collaborator { case_id, .. } => *case_id,
            CaseError::Store(_) => None,
        }
    }
}

impl From<StorageError> for CaseError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::CaseNotFound { case_id, version } => {
                CaseError::CaseNotFound { case_id, version }
            }
            StorageError::DuplicateActiveCase { constraint, detail } => {
                CaseError::DuplicateActiveCase {
                    case_id: None,
                    constraint,
                    detail,
                }
            }
            StorageError::PersistenceConflict {
                case_id,
                expected_version,
            } => CaseError::PersistenceConflict {
                case_id,
                expected_version,
            },
            StorageError::IdentityImmutable { case_id } => CaseError::IdentityChanged {
                case_id: Some(case_id),
                detail: "rejected by the store".to_string(),
            },
            StorageError::InvalidRecord(reason) => CaseError::InvalidCase {
                case_id: None,
                reason,
            },
            StorageError::Backend(message) => CaseError::Store(message),
        }
    }
}

fn label(case_id: &Option<i64>) -> String {
    match case_id {
        Some(id) => format!("case {id}"),
        None => "unsaved case".to_string(),
    }
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
    fn storage_errors_map_onto_the_taxonomy() {
        let err: CaseError = StorageError::CaseNotFound {
            case_id: 999_999_999,
            version: None,
        }
        .into();
        assert!(matches!(
            err,
            CaseError::CaseNotFound {
                case_id: 999_999_999,
                ..
            }
        ));

        let err: CaseError = StorageError::IdentityImmutable { case_id: 3 }.into();
        assert_eq!(err.case_id(), Some(3));
        assert!(matches!(err, CaseError::IdentityChanged { .. }));

        let err: CaseError = StorageError::Backend("disk I/O error".into()).into();
        assert!(matches!(err, CaseError::Store(_)));
    }

    #[test]
    fn messages_name_the_case() {
        let err = CaseError::InvalidTransition {
            case_id: Some(12),
            from: CaseState::Resolved,
            to: CaseState::New,
        };
        assert_eq!(
            err.to_string(),
            "case 12: transition RESOLVED -> NEW is not allowed"
        );

        let err = CaseError::IncompleteIdentity { case_id: None };
        assert_eq!(err.to_string(), "unsaved case: no complete identity pair");
    }

    #[test]
    fn affinity_message_shows_unset_hostname() {
        let err = CaseError::HostAffinityViolation {
            case_id: Some(4),
            expected: "node1".into(),
            actual: None,
        };
        assert_eq!(
            err.to_string(),
            "case 4: belongs to host <unset>, this host is node1"
        );
    }
}
