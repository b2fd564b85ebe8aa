//! The progression engine: one step of a case's lifecycle per call.
//!
//! A call loads (or receives) the active case, reconciles it against the
//! inventory, checks it belongs to this host's cluster, then dispatches on
//! the current state to advance, wait, or escalate. Every state change is
//! persisted as a new version before the call returns.

use std::sync::Arc;

use dlc_storage::{Case, CaseState, CaseStore, DiagnosticStatus};

use crate::collaborators::{
    AdminAction, AdminError, AdminExecutor, DiagnosticProbe, HealthOracle, InventoryService,
    ResourceRef,
};
use crate::config::EngineConfig;
use crate::error::CaseError;
use crate::host::HostIdentity;
use crate::reconcile::Reconciler;
use crate::repository::{CaseRepository, SaveMode};
use crate::transition::{allowed_targets, transition};

/// The outside services a progression engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub inventory: Arc<dyn InventoryService>,
    pub health: Arc<dyn HealthOracle>,
    pub probe: Arc<dyn DiagnosticProbe>,
    pub admin: Arc<dyn AdminExecutor>,
}

/// What a state asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Nothing to do without an operator.
    Park,
    /// Take this edge and save.
    Advance(CaseState),
    /// Drain and mark the resource out, then wait for recovery.
    Prepare,
    /// Poll cluster health; on clean, remove the resource.
    AwaitRecovery,
}

fn plan(case: &Case) -> Step {
    use CaseState::*;
    match case.state {
        Resolved | OperatorNeeded => Step::Park,
        NewDetail => Step::Prepare,
        RecoveryWait => Step::AwaitRecovery,
        ResourceRemoved | TestDone => Step::Advance(route_on_diagnostic(case)),
        state => match allowed_targets(state) {
            [only] => Step::Advance(*only),
            _ => Step::Advance(OperatorNeeded),
        },
    }
}

/// Pick the branch out of a two-way state from the cached diagnostic.
/// An unknown diagnostic cannot be decided automatically.
fn route_on_diagnostic(case: &Case) -> CaseState {
    use CaseState::*;
    match (case.state, case.diagnostic) {
        (ResourceRemoved, DiagnosticStatus::Pass) => DriveTesting,
        (TestDone, DiagnosticStatus::Pass) => RebuildResource,
        (ResourceRemoved | TestDone, DiagnosticStatus::Fail) => ReplaceResource,
        _ => OperatorNeeded,
    }
}

pub struct ProgressionEngine<S: CaseStore> {
    repo: CaseRepository<S>,
    reconciler: Reconciler,
    health: Arc<dyn HealthOracle>,
    admin: Arc<dyn AdminExecutor>,
    config: EngineConfig,
}

impl<S: CaseStore> ProgressionEngine<S> {
    pub fn new(
        repo: CaseRepository<S>,
        collaborators: Collaborators,
        host: HostIdentity,
        config: EngineConfig,
    ) -> Self {
        let Collaborators {
            inventory,
            health,
            probe,
            admin,
        } = collaborators;
        Self {
            repo,
            reconciler: Reconciler::new(inventory, probe, host),
            health,
            admin,
            config,
        }
    }

    pub fn repository(&self) -> &CaseRepository<S> {
        &self.repo
    }

    pub fn host(&self) -> &HostIdentity {
        self.reconciler.host()
    }

    /// Load the active version of `case_id` and progress it.
    pub fn progress_case(&self, case_id: i64) -> Result<Option<Case>, CaseError> {
        let case = self.repo.load(case_id)?;
        self.progress(case)
    }

    /// Take at most one lifecycle step. Returns the newly stored case, or
    /// `None` when nothing was written (parked, or still waiting).
    pub fn progress(&self, mut case: Case) -> Result<Option<Case>, CaseError> {
        if plan(&case) == Step::Park {
            tracing::debug!(case_id = case.case_id, state = %case.state, "case parked");
            return Ok(None);
        }

        self.reconciler.reconcile(&mut case)?;
        self.check_cluster(&case)?;

        match plan(&case) {
            Step::Park => Ok(None),
            Step::Advance(target) => self.advance(case, target).map(Some),
            Step::Prepare => self.prepare(case).map(Some),
            Step::AwaitRecovery => self.await_recovery(case),
        }
    }

    fn check_cluster(&self, case: &Case) -> Result<(), CaseError> {
        let expected = &self.host().cluster_id;
        if case.cluster_id.as_ref() == Some(expected) {
            return Ok(());
        }
        Err(CaseError::ClusterAffinityViolation {
            case_id: case.case_id,
            expected: expected.clone(),
            actual: case.cluster_id.clone(),
        })
    }

    fn advance(&self, mut case: Case, target: CaseState) -> Result<Case, CaseError> {
        let from = case.state;
        transition(&mut case, target)?;
        let stored = self.repo.save(&case, SaveMode::NewVersion)?;
        tracing::info!(
            case_id = stored.case_id,
            %from,
            to = %target,
            version = stored.version_number,
            "case advanced"
        );
        Ok(stored)
    }

    fn prepare(&self, mut case: Case) -> Result<Case, CaseError> {
        let resource = resource_ref(&case)?;
        let drain_weight = self.config.drain_weight;

        if let Err(e) = self.admin.stop_daemon(&resource) {
            return Err(self.escalate(case, AdminAction::StopDaemon, e));
        }
        if let Err(e) = self.admin.reweight(&resource, drain_weight) {
            return Err(self.escalate(case, AdminAction::Reweight, e));
        }
        case.resource_weight = Some(drain_weight);
        if let Err(e) = self.admin.mark_out(&resource) {
            return Err(self.escalate(case, AdminAction::MarkOut, e));
        }
        tracing::info!(case_id = case.case_id, %resource, "resource drained and marked out");
        self.advance(case, CaseState::RecoveryWait)
    }

    fn await_recovery(&self, case: Case) -> Result<Option<Case>, CaseError> {
        let clean = self
            .health
            .is_clean()
            .map_err(|e| CaseError::Collaborator {
                case_id: case.case_id,
                service: "health oracle",
                message: e.to_string(),
            })?;
        if !clean {
            tracing::debug!(case_id = case.case_id, "cluster not clean yet");
            return Ok(None);
        }

        let resource = resource_ref(&case)?;
        let case = self.advance(case, CaseState::RecoveryDone)?;
        if let Err(e) = self
            .admin
            .remove_resource(&resource, &self.config.removal)
        {
            return Err(self.escalate(case, AdminAction::RemoveResource, e));
        }
        self.advance(case, CaseState::ResourceRemoved).map(Some)
    }

    /// Park the case after a failed admin action and report the failure.
    /// The escalation is persisted before the error is returned; if that
    /// save fails, its error is returned instead.
    fn escalate(&self, mut case: Case, action: AdminAction, source: AdminError) -> CaseError {
        let state = case.state;
        let case_id = match persisted_id(&case) {
            Ok(id) => id,
            Err(e) => return e,
        };
        tracing::warn!(case_id, %state, %action, error = %source, "admin action failed, escalating");
        if let Err(e) = transition(&mut case, CaseState::OperatorNeeded) {
            return e;
        }
        if let Err(e) = self.repo.save(&case, SaveMode::NewVersion) {
            return e;
        }
        CaseError::AdminActionFailed {
            case_id,
            state,
            action,
            source,
        }
    }
}

fn persisted_id(case: &Case) -> Result<i64, CaseError> {
    case.case_id.ok_or_else(|| CaseError::InvalidCase {
        case_id: None,
        reason: "case has never been created".to_string(),
    })
}

/// The admin target for a reconciled case.
fn resource_ref(case: &Case) -> Result<ResourceRef, CaseError> {
    match (
        case.resource_id,
        &case.cluster_id,
        &case.hostname,
        &case.device_path,
    ) {
        (Some(resource_id), Some(cluster_id), Some(hostname), Some(device_path)) => {
            Ok(ResourceRef {
                resource_id,
                cluster_id: cluster_id.clone(),
                hostname: hostname.clone(),
                device_path: device_path.clone(),
            })
        }
        _ => Err(CaseError::IncompleteIdentity {
            case_id: case.case_id,
        }),
    }
}
