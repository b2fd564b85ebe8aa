use super::{host_case, insert, run, TestResult};
use crate::record::{Case, CaseState};
use crate::CaseStore;

pub(super) fn run_create_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: CaseStore,
    F: Fn() -> S,
{
    vec![
        run("create", "insert_assigns_version_one", factory, insert_assigns_version_one),
        run("create", "insert_assigns_distinct_ids", factory, insert_assigns_distinct_ids),
        run("create", "insert_ignores_caller_bookkeeping", factory, insert_ignores_caller_bookkeeping),
        run("create", "insert_stamps_recorded_at", factory, insert_stamps_recorded_at),
        run("create", "insert_without_identity_is_allowed", factory, insert_without_identity_is_allowed),
        run("create", "inserted_case_is_listed", factory, inserted_case_is_listed),
    ]
}

fn insert_assigns_version_one<S: CaseStore>(s: &S) -> Result<(), String> {
    let stored = insert(s, &host_case("node1", "sdb"))?;
    if stored.version_number != 1 {
        return Err(format!("expected version 1, got {}", stored.version_number));
    }
    if !stored.active {
        return Err("inserted case is not active".to_string());
    }
    if stored.state != CaseState::New {
        return Err(format!("expected state NEW, got {}", stored.state));
    }
    Ok(())
}

fn insert_assigns_distinct_ids<S: CaseStore>(s: &S) -> Result<(), String> {
    let a = insert(s, &host_case("node1", "sda"))?;
    let b = insert(s, &host_case("node1", "sdb"))?;
    match (a.case_id, b.case_id) {
        (Some(a), Some(b)) if b > a => Ok(()),
        other => Err(format!("expected increasing ids, got {other:?}")),
    }
}

/// `case_id`, `version_number` and `active` belong to the store.
fn insert_ignores_caller_bookkeeping<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut case = host_case("node1", "sdb");
    case.case_id = Some(424242);
    case.version_number = 9;
    case.active = false;
    let stored = insert(s, &case)?;
    if stored.case_id == Some(424242) {
        return Err("store accepted a caller-chosen case_id".to_string());
    }
    if stored.version_number != 1 || !stored.active {
        return Err(format!(
            "expected active version 1, got version {} active={}",
            stored.version_number, stored.active
        ));
    }
    Ok(())
}

fn insert_stamps_recorded_at<S: CaseStore>(s: &S) -> Result<(), String> {
    let stored = insert(s, &host_case("node1", "sdb"))?;
    match stored.recorded_at.as_deref() {
        Some(ts) if !ts.is_empty() => Ok(()),
        other => Err(format!("expected a timestamp, got {other:?}")),
    }
}

/// Identity is required by the repository, not the store.
fn insert_without_identity_is_allowed<S: CaseStore>(s: &S) -> Result<(), String> {
    insert(s, &Case::open())?;
    insert(s, &Case::open())?;
    Ok(())
}

fn inserted_case_is_listed<S: CaseStore>(s: &S) -> Result<(), String> {
    let stored = insert(s, &host_case("node1", "sdb"))?;
    let listed = s.list_active(None).map_err(|e| e.to_string())?;
    if listed != vec![stored] {
        return Err(format!("expected exactly the inserted case, got {listed:?}"));
    }
    Ok(())
}
