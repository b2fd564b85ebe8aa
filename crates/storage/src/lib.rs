//! Versioned, constraint-enforcing persistence for disk remediation cases.
//!
//! The `CaseStore` trait is the seam; `SqliteCaseStore` is the durable
//! backend and `MemoryCaseStore` the in-process one. Both are held to the
//! same rules by the [`conformance`] suite.

pub mod conformance;
mod error;
mod memory;
mod record;
mod schema;
mod sqlite;
mod traits;

pub use error::StorageError;
pub use memory::MemoryCaseStore;
pub use record::{
    normalize_device_path, now_rfc3339, Action, Case, CaseState, DiagnosticStatus,
    IdentityConstraint, IdentityKey, ParseEnumError, WaitReason,
};
pub use sqlite::SqliteCaseStore;
pub use traits::CaseStore;
