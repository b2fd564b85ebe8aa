use dlc_core::{CaseOperator, CaseRepository, CaseState, CaseStore};

use crate::commands::{fail, print_case};
use crate::OutputFormat;

pub(crate) fn cmd_escalate<S: CaseStore>(
    repo: &CaseRepository<S>,
    case_id: i64,
    output: OutputFormat,
    quiet: bool,
) {
    match CaseOperator::new(repo).escalate(case_id) {
        Ok(case) => print_case(&case, output),
        Err(err) => fail(&err, output, quiet),
    }
}

pub(crate) fn cmd_transition<S: CaseStore>(
    repo: &CaseRepository<S>,
    case_id: i64,
    target: CaseState,
    output: OutputFormat,
    quiet: bool,
) {
    match CaseOperator::new(repo).override_state(case_id, target) {
        Ok(case) => print_case(&case, output),
        Err(err) => fail(&err, output, quiet),
    }
}
