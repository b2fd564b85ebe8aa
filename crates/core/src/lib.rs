//! dlc-core: the disk remediation case state machine.
//!
//! # Public API
//!
//! - [`CaseRepository`] -- create, load, save and version cases
//! - [`transition()`] / [`can_transition`] -- the transition table
//! - [`Reconciler`] -- identity resolution against the inventory
//! - [`ProgressionEngine`] -- advance a case by one lifecycle step
//! - [`CaseOperator`] -- manual escalation and override
//! - [`CaseError`] -- the error taxonomy shared by all of the above
//!
//! Record types and the store trait live in `dlc-storage` and are
//! re-exported here.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod host;
pub mod operator;
pub mod progress;
pub mod reconcile;
pub mod repository;
pub mod transition;

// ── Convenience re-exports ───────────────────────────────────────────

pub use collaborators::{
    AdminAction, AdminError, AdminExecutor, CollaboratorError, DiagnosticProbe, HealthOracle,
    InventoryService, LookupScope, ProbeError, RemovalOptions, ResourceRecord, ResourceRef,
    StaticHealthOracle, StaticInventory, StaticProbe,
};
pub use config::{ConfigError, EngineConfig};
pub use error::CaseError;
pub use host::HostIdentity;
pub use operator::CaseOperator;
pub use progress::{Collaborators, ProgressionEngine};
pub use reconcile::Reconciler;
pub use repository::{CaseRepository, SaveMode};
pub use transition::{allowed_targets, annotations, can_transition, transition};

pub use dlc_storage::{
    Action, Case, CaseState, CaseStore, DiagnosticStatus, IdentityConstraint, IdentityKey,
    MemoryCaseStore, SqliteCaseStore, StorageError, WaitReason,
};
