use dlc_core::{CaseRepository, CaseState, CaseStore};

use crate::commands::{fail, print_cases};
use crate::OutputFormat;

pub(crate) fn cmd_list<S: CaseStore>(
    repo: &CaseRepository<S>,
    all: bool,
    state: Option<CaseState>,
    output: OutputFormat,
    quiet: bool,
) {
    let active = match repo.list_active(state) {
        Ok(cases) => cases,
        Err(err) => fail(&err, output, quiet),
    };
    if !all {
        print_cases(&active, output, quiet);
        return;
    }

    let mut rows = Vec::new();
    for case in active {
        let Some(case_id) = case.case_id else {
            continue;
        };
        let archived = match repo.history(case_id) {
            Ok(versions) => versions,
            Err(err) => fail(&err, output, quiet),
        };
        rows.extend(
            archived
                .into_iter()
                .filter(|v| state.map_or(true, |s| v.state == s)),
        );
        rows.push(case);
    }
    print_cases(&rows, output, quiet);
}
