use dlc_core::{CaseRepository, CaseStore};

use crate::commands::{fail, print_case, print_cases};
use crate::OutputFormat;

pub(crate) fn cmd_show<S: CaseStore>(
    repo: &CaseRepository<S>,
    case_id: i64,
    version: Option<i64>,
    output: OutputFormat,
    quiet: bool,
) {
    let result = match version {
        Some(v) => repo.load_version(case_id, v),
        None => repo.load(case_id),
    };
    match result {
        Ok(case) => print_case(&case, output),
        Err(err) => fail(&err, output, quiet),
    }
}

pub(crate) fn cmd_history<S: CaseStore>(
    repo: &CaseRepository<S>,
    case_id: i64,
    output: OutputFormat,
    quiet: bool,
) {
    match repo.history(case_id) {
        Ok(versions) => print_cases(&versions, output, quiet),
        Err(err) => fail(&err, output, quiet),
    }
}
