use super::{case_id, host_case, insert, run, TestResult};
use crate::record::{Action, CaseState};
use crate::{CaseStore, StorageError};

pub(super) fn run_version_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: CaseStore,
    F: Fn() -> S,
{
    vec![
        run("version", "supersede_increments_version", factory, supersede_increments_version),
        run("version", "supersede_archives_previous_row", factory, supersede_archives_previous_row),
        run("version", "n_supersedes_leave_n_history_rows", factory, n_supersedes_leave_n_history_rows),
        run("version", "update_in_place_keeps_version", factory, update_in_place_keeps_version),
        run("version", "stale_supersede_is_a_conflict", factory, stale_supersede_is_a_conflict),
        run("version", "stale_update_is_a_conflict", factory, stale_update_is_a_conflict),
        run("version", "conflict_changes_nothing", factory, conflict_changes_nothing),
        run("version", "supersede_missing_case_is_not_found", factory, supersede_missing_case_is_not_found),
        run("version", "versions_are_per_case", factory, versions_are_per_case),
    ]
}

fn supersede_increments_version<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut case = insert(s, &host_case("node1", "sdb"))?;
    case.state = CaseState::NewDetail;
    let next = s.supersede_active(&case).map_err(|e| e.to_string())?;
    if next.version_number != 2 || next.state != CaseState::NewDetail {
        return Err(format!("expected NEW_DETAIL v2, got {} v{}", next.state, next.version_number));
    }
    let loaded = s.load_active(case_id(&case)?).map_err(|e| e.to_string())?;
    if loaded != next {
        return Err(format!("active row {loaded:?} differs from returned {next:?}"));
    }
    Ok(())
}

fn supersede_archives_previous_row<S: CaseStore>(s: &S) -> Result<(), String> {
    let first = insert(s, &host_case("node1", "sdb"))?;
    let mut next = first.clone();
    next.state = CaseState::NewDetail;
    s.supersede_active(&next).map_err(|e| e.to_string())?;

    let history = s.history(case_id(&first)?).map_err(|e| e.to_string())?;
    let [archived] = history.as_slice() else {
        return Err(format!("expected 1 history row, got {}", history.len()));
    };
    let mut expected = first.clone();
    expected.active = false;
    if *archived != expected {
        return Err(format!("archived {archived:?}, expected {expected:?}"));
    }
    Ok(())
}

fn n_supersedes_leave_n_history_rows<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut case = insert(s, &host_case("node1", "sdb"))?;
    let id = case_id(&case)?;
    for _ in 0..5 {
        case = s.supersede_active(&case).map_err(|e| e.to_string())?;
    }
    if case.version_number != 6 {
        return Err(format!("expected version 6, got {}", case.version_number));
    }
    let versions: Vec<i64> = s
        .history(id)
        .map_err(|e| e.to_string())?
        .iter()
        .map(|c| c.version_number)
        .collect();
    if versions != [1, 2, 3, 4, 5] {
        return Err(format!("history versions out of order: {versions:?}"));
    }
    Ok(())
}

fn update_in_place_keeps_version<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut case = insert(s, &host_case("node1", "sdb"))?;
    case.action = Action::CheckingSmart;
    let updated = s.update_active(&case).map_err(|e| e.to_string())?;
    if updated.version_number != 1 || updated.action != Action::CheckingSmart {
        return Err(format!("unexpected in-place result {updated:?}"));
    }
    let history = s.history(case_id(&case)?).map_err(|e| e.to_string())?;
    if !history.is_empty() {
        return Err(format!("in-place update archived {} rows", history.len()));
    }
    Ok(())
}

fn stale_supersede_is_a_conflict<S: CaseStore>(s: &S) -> Result<(), String> {
    let stale = insert(s, &host_case("node1", "sdb"))?;
    s.supersede_active(&stale).map_err(|e| e.to_string())?;
    match s.supersede_active(&stale) {
        Err(StorageError::PersistenceConflict {
            expected_version: 1,
            ..
        }) => Ok(()),
        other => Err(format!("expected PersistenceConflict, got {other:?}")),
    }
}

fn stale_update_is_a_conflict<S: CaseStore>(s: &S) -> Result<(), String> {
    let stale = insert(s, &host_case("node1", "sdb"))?;
    s.supersede_active(&stale).map_err(|e| e.to_string())?;
    match s.update_active(&stale) {
        Err(StorageError::PersistenceConflict { .. }) => Ok(()),
        other => Err(format!("expected PersistenceConflict, got {other:?}")),
    }
}

fn conflict_changes_nothing<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut stale = insert(s, &host_case("node1", "sdb"))?;
    let id = case_id(&stale)?;
    let winner = s.supersede_active(&stale).map_err(|e| e.to_string())?;

    stale.state = CaseState::OperatorNeeded;
    if s.supersede_active(&stale).is_ok() {
        return Err("stale write succeeded".to_string());
    }
    let active = s.load_active(id).map_err(|e| e.to_string())?;
    let history = s.history(id).map_err(|e| e.to_string())?;
    if active != winner || history.len() != 1 {
        return Err(format!(
            "conflict mutated the store: active {active:?}, {} history rows",
            history.len()
        ));
    }
    Ok(())
}

fn supersede_missing_case_is_not_found<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut ghost = host_case("node1", "sdb");
    ghost.case_id = Some(77);
    match s.supersede_active(&ghost) {
        Err(StorageError::CaseNotFound { case_id: 77, .. }) => Ok(()),
        other => Err(format!("expected CaseNotFound, got {other:?}")),
    }
}

fn versions_are_per_case<S: CaseStore>(s: &S) -> Result<(), String> {
    let a = insert(s, &host_case("node1", "sda"))?;
    let b = insert(s, &host_case("node1", "sdb"))?;
    let a2 = s.supersede_active(&a).map_err(|e| e.to_string())?;
    let a3 = s.supersede_active(&a2).map_err(|e| e.to_string())?;
    let b_now = s.load_active(case_id(&b)?).map_err(|e| e.to_string())?;
    if a3.version_number != 3 || b_now.version_number != 1 {
        return Err(format!(
            "expected a at v3 and b at v1, got v{} and v{}",
            a3.version_number, b_now.version_number
        ));
    }
    Ok(())
}
