//! The transition table.
//!
//! Forward edges are listed per state. On top of them:
//!
//! - every non-terminal state may escape to `OPERATOR_NEEDED`
//! - `OPERATOR_NEEDED` may move to any state (manual override)
//! - `RESOLVED` has no outgoing edges at all

use dlc_storage::{Action, Case, CaseState, WaitReason};

use crate::error::CaseError;

/// Forward (non-escape) edges out of `state`.
pub fn allowed_targets(state: CaseState) -> &'static [CaseState] {
    use CaseState::*;
    match state {
        New => &[NewDetail],
        NewDetail => &[RecoveryWait],
        RecoveryWait => &[RecoveryDone],
        RecoveryDone => &[ResourceRemoved],
        ResourceRemoved => &[DriveTesting, ReplaceResource],
        DriveTesting => &[TestDone],
        TestDone => &[ReplaceResource, RebuildResource],
        ReplaceResource => &[WaitForReplacement],
        WaitForReplacement => &[RebuildResource],
        RebuildResource => &[Resolved],
        Resolved => &[],
        OperatorNeeded => &[],
    }
}

pub fn can_transition(from: CaseState, to: CaseState) -> bool {
    if from == CaseState::OperatorNeeded {
        return true;
    }
    if to == CaseState::OperatorNeeded {
        return !from.is_terminal();
    }
    allowed_targets(from).contains(&to)
}

/// Descriptive `action` / `wait_reason` for a case that has just entered
/// `state`.
pub fn annotations(state: CaseState) -> (Action, WaitReason) {
    use CaseState::*;
    match state {
        New => (Action::Logging, WaitReason::None),
        NewDetail => (Action::CheckingInfo, WaitReason::None),
        RecoveryWait => (Action::ReweightingResource, WaitReason::ClusterHealth),
        RecoveryDone => (Action::RemovingResource, WaitReason::None),
        ResourceRemoved => (Action::CheckingSmart, WaitReason::None),
        DriveTesting => (Action::TestingDrive, WaitReason::DriveTestCompletion),
        WaitForReplacement => (Action::None, WaitReason::DriveReplacement),
        RebuildResource => (Action::RebuildingResource, WaitReason::None),
        OperatorNeeded => (Action::OperatorHandoff, WaitReason::None),
        TestDone | ReplaceResource | Resolved => (Action::None, WaitReason::None),
    }
}

/// Move `case` to `target` in memory. On error the case is left untouched.
pub fn transition(case: &mut Case, target: CaseState) -> Result<(), CaseError> {
    if !can_transition(case.state, target) {
        return Err(CaseError::InvalidTransition {
            case_id: case.case_id,
            from: case.state,
            to: target,
        });
    }
    tracing::debug!(
        case_id = case.case_id,
        from = %case.state,
        to = %target,
        "transition"
    );
    case.state = target;
    (case.action, case.wait_reason) = annotations(target);
    Ok(())
}
