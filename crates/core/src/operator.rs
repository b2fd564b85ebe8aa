//! Manual override path.
//!
//! Operators park a case in `OPERATOR_NEEDED` or move it anywhere from
//! there. Both go through the transition table and a new-version save, so
//! the history records who moved the case where.

use dlc_storage::{Case, CaseState, CaseStore};

use crate::error::CaseError;
use crate::repository::{CaseRepository, SaveMode};
use crate::transition::transition;

pub struct CaseOperator<'r, S: CaseStore> {
    repo: &'r CaseRepository<S>,
}

impl<'r, S: CaseStore> CaseOperator<'r, S> {
    pub fn new(repo: &'r CaseRepository<S>) -> Self {
        Self { repo }
    }

    /// Hand the case to an operator. A case already waiting for one is
    /// returned as-is without a write.
    pub fn escalate(&self, case_id: i64) -> Result<Case, CaseError> {
        let case = self.repo.load(case_id)?;
        if case.state == CaseState::OperatorNeeded {
            return Ok(case);
        }
        self.move_to(case, CaseState::OperatorNeeded)
    }

    /// Apply `target` if the transition table allows it from the current
    /// state.
    pub fn override_state(&self, case_id: i64, target: CaseState) -> Result<Case, CaseError> {
        let case = self.repo.load(case_id)?;
        self.move_to(case, target)
    }

    fn move_to(&self, mut case: Case, target: CaseState) -> Result<Case, CaseError> {
        let from = case.state;
        transition(&mut case, target)?;
        let stored = self.repo.save(&case, SaveMode::NewVersion)?;
        tracing::info!(
            case_id = stored.case_id,
            %from,
            to = %target,
            version = stored.version_number,
            "operator moved case"
        );
        Ok(stored)
    }
}
