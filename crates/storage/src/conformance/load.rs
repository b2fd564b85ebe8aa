use super::{case_id, host_case, insert, run, TestResult};
use crate::record::{CaseState, IdentityKey};
use crate::{CaseStore, StorageError};

pub(super) fn run_load_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: CaseStore,
    F: Fn() -> S,
{
    vec![
        run("load", "load_returns_inserted_case", factory, load_returns_inserted_case),
        run("load", "load_missing_case_is_not_found", factory, load_missing_case_is_not_found),
        run("load", "load_version_reads_history", factory, load_version_reads_history),
        run("load", "load_missing_version_is_not_found", factory, load_missing_version_is_not_found),
        run("load", "find_active_by_either_key", factory, find_active_by_either_key),
        run("load", "list_active_filters_by_state", factory, list_active_filters_by_state),
        run("load", "history_of_missing_case_is_not_found", factory, history_of_missing_case_is_not_found),
    ]
}

fn load_returns_inserted_case<S: CaseStore>(s: &S) -> Result<(), String> {
    let stored = insert(s, &host_case("node1", "sdb").with_resource(7, "c1"))?;
    let loaded = s.load_active(case_id(&stored)?).map_err(|e| e.to_string())?;
    if loaded != stored {
        return Err(format!("loaded {loaded:?}, inserted {stored:?}"));
    }
    Ok(())
}

fn load_missing_case_is_not_found<S: CaseStore>(s: &S) -> Result<(), String> {
    match s.load_active(999_999_999) {
        Err(StorageError::CaseNotFound {
            case_id: 999_999_999,
            version: None,
        }) => Ok(()),
        other => Err(format!("expected CaseNotFound, got {other:?}")),
    }
}

fn load_version_reads_history<S: CaseStore>(s: &S) -> Result<(), String> {
    let first = insert(s, &host_case("node1", "sdb"))?;
    let mut next = first.clone();
    next.state = CaseState::NewDetail;
    let second = s.supersede_active(&next).map_err(|e| e.to_string())?;
    let id = case_id(&first)?;

    let v1 = s.load_version(id, 1).map_err(|e| e.to_string())?;
    if v1.state != CaseState::New || v1.active {
        return Err(format!("version 1 should be archived NEW, got {v1:?}"));
    }
    let v2 = s.load_version(id, 2).map_err(|e| e.to_string())?;
    if v2 != second {
        return Err(format!("version 2 should be the active row, got {v2:?}"));
    }
    Ok(())
}

fn load_missing_version_is_not_found<S: CaseStore>(s: &S) -> Result<(), String> {
    let stored = insert(s, &host_case("node1", "sdb"))?;
    let id = case_id(&stored)?;
    match s.load_version(id, 5) {
        Err(StorageError::CaseNotFound {
            version: Some(5), ..
        }) => Ok(()),
        other => Err(format!("expected CaseNotFound for version 5, got {other:?}")),
    }
}

fn find_active_by_either_key<S: CaseStore>(s: &S) -> Result<(), String> {
    let stored = insert(s, &host_case("node1", "sdb").with_resource(7, "c1"))?;
    let by_host = s
        .find_active(&IdentityKey::HostDevice {
            hostname: "node1".to_string(),
            device_path: "sdb".to_string(),
        })
        .map_err(|e| e.to_string())?;
    let by_resource = s
        .find_active(&IdentityKey::ResourceCluster {
            resource_id: 7,
            cluster_id: "c1".to_string(),
        })
        .map_err(|e| e.to_string())?;
    let missing = s
        .find_active(&IdentityKey::ResourceCluster {
            resource_id: 7,
            cluster_id: "c2".to_string(),
        })
        .map_err(|e| e.to_string())?;
    if by_host.as_ref() != Some(&stored) || by_resource.as_ref() != Some(&stored) {
        return Err("lookup by identity did not return the stored case".to_string());
    }
    if missing.is_some() {
        return Err("lookup in another cluster found a case".to_string());
    }
    Ok(())
}

fn list_active_filters_by_state<S: CaseStore>(s: &S) -> Result<(), String> {
    insert(s, &host_case("node1", "sda"))?;
    let mut moved = insert(s, &host_case("node1", "sdb"))?;
    moved.state = CaseState::NewDetail;
    s.supersede_active(&moved).map_err(|e| e.to_string())?;

    let all = s.list_active(None).map_err(|e| e.to_string())?;
    let detail = s
        .list_active(Some(CaseState::NewDetail))
        .map_err(|e| e.to_string())?;
    if all.len() != 2 {
        return Err(format!("expected 2 active cases, got {}", all.len()));
    }
    if detail.len() != 1 || detail[0].case_id != moved.case_id {
        return Err(format!("state filter returned {detail:?}"));
    }
    Ok(())
}

fn history_of_missing_case_is_not_found<S: CaseStore>(s: &S) -> Result<(), String> {
    match s.history(31337) {
        Err(StorageError::CaseNotFound { .. }) => Ok(()),
        other => Err(format!("expected CaseNotFound, got {other:?}")),
    }
}
