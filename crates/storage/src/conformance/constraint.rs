use super::{case_id, host_case, insert, insert_past_new, run, TestResult};
use crate::record::{CaseState, IdentityConstraint};
use crate::{CaseStore, StorageError};

pub(super) fn run_constraint_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: CaseStore,
    F: Fn() -> S,
{
    vec![
        run("constraint", "duplicate_host_device_rejected", factory, duplicate_host_device_rejected),
        run("constraint", "duplicate_resource_cluster_rejected", factory, duplicate_resource_cluster_rejected),
        run("constraint", "same_resource_other_cluster_allowed", factory, same_resource_other_cluster_allowed),
        run("constraint", "rejected_insert_leaves_no_row", factory, rejected_insert_leaves_no_row),
        run("constraint", "update_cannot_steal_identity", factory, update_cannot_steal_identity),
        run("constraint", "identity_mutable_while_new", factory, identity_mutable_while_new),
        run("constraint", "identity_frozen_past_new", factory, identity_frozen_past_new),
        run("constraint", "identity_frozen_after_return_to_new", factory, identity_frozen_after_return_to_new),
        run("constraint", "unset_identity_may_be_filled", factory, unset_identity_may_be_filled),
        run("constraint", "negative_weight_rejected", factory, negative_weight_rejected),
        run("constraint", "negative_resource_id_rejected", factory, negative_resource_id_rejected),
        run("constraint", "update_without_case_id_rejected", factory, update_without_case_id_rejected),
    ]
}

fn duplicate_host_device_rejected<S: CaseStore>(s: &S) -> Result<(), String> {
    insert(s, &host_case("node1", "sdb"))?;
    match s.insert_case(&host_case("node1", "sdb")) {
        Err(StorageError::DuplicateActiveCase {
            constraint: IdentityConstraint::HostDevice,
            ..
        }) => Ok(()),
        other => Err(format!("expected DuplicateActiveCase(host/device), got {other:?}")),
    }
}

fn duplicate_resource_cluster_rejected<S: CaseStore>(s: &S) -> Result<(), String> {
    insert(s, &host_case("node1", "sda").with_resource(7, "c1"))?;
    match s.insert_case(&host_case("node2", "sdc").with_resource(7, "c1")) {
        Err(StorageError::DuplicateActiveCase {
            constraint: IdentityConstraint::ResourceCluster,
            ..
        }) => Ok(()),
        other => Err(format!(
            "expected DuplicateActiveCase(resource/cluster), got {other:?}"
        )),
    }
}

fn same_resource_other_cluster_allowed<S: CaseStore>(s: &S) -> Result<(), String> {
    insert(s, &host_case("node1", "sda").with_resource(7, "c1"))?;
    insert(s, &host_case("node2", "sda").with_resource(7, "c2"))?;
    Ok(())
}

fn rejected_insert_leaves_no_row<S: CaseStore>(s: &S) -> Result<(), String> {
    insert(s, &host_case("node1", "sdb"))?;
    let _ = s.insert_case(&host_case("node1", "sdb"));
    let active = s.list_active(None).map_err(|e| e.to_string())?;
    if active.len() != 1 {
        return Err(format!("expected 1 active case, got {}", active.len()));
    }
    Ok(())
}

fn update_cannot_steal_identity<S: CaseStore>(s: &S) -> Result<(), String> {
    insert(s, &host_case("node1", "sda"))?;
    let mut other = insert(s, &host_case("node2", "sdb"))?;
    other.hostname = Some("node1".to_string());
    other.device_path = Some("sda".to_string());
    match s.supersede_active(&other) {
        Err(StorageError::DuplicateActiveCase { .. }) => Ok(()),
        other => Err(format!("expected DuplicateActiveCase, got {other:?}")),
    }
}

fn identity_mutable_while_new<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut case = insert(s, &host_case("node1", "sdb"))?;
    case.hostname = Some("node1.example".to_string());
    let stored = s.update_active(&case).map_err(|e| e.to_string())?;
    if stored.hostname.as_deref() != Some("node1.example") {
        return Err(format!("hostname not updated: {stored:?}"));
    }
    Ok(())
}

fn identity_frozen_past_new<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut case = insert_past_new(s, "node1", "sdb")?;
    let id = case_id(&case)?;
    case.device_path = Some("sdc".to_string());
    match s.supersede_active(&case) {
        Err(StorageError::IdentityImmutable { case_id }) if case_id == id => {}
        other => return Err(format!("expected IdentityImmutable, got {other:?}")),
    }
    case.device_path = Some("sdb".to_string());
    case.resource_id = Some(8);
    match s.update_active(&case) {
        Err(StorageError::IdentityImmutable { .. }) => Ok(()),
        other => Err(format!("expected IdentityImmutable, got {other:?}")),
    }
}

/// Moving a case back to `NEW` does not reopen its identity.
fn identity_frozen_after_return_to_new<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut case = insert_past_new(s, "node1", "sdb")?;
    case.state = CaseState::OperatorNeeded;
    let mut case = s.supersede_active(&case).map_err(|e| e.to_string())?;
    case.state = CaseState::New;
    let mut case = s.supersede_active(&case).map_err(|e| e.to_string())?;

    case.hostname = Some("node9".to_string());
    case.device_path = Some("sdz".to_string());
    case.resource_id = Some(99);
    match s.update_active(&case) {
        Err(StorageError::IdentityImmutable { .. }) => {}
        other => return Err(format!("expected IdentityImmutable on update, got {other:?}")),
    }
    match s.supersede_active(&case) {
        Err(StorageError::IdentityImmutable { .. }) => {}
        other => return Err(format!("expected IdentityImmutable on supersede, got {other:?}")),
    }

    let id = case_id(&case)?;
    let active = s.load_active(id).map_err(|e| e.to_string())?;
    if active.hostname.as_deref() != Some("node1") || active.resource_id != Some(7) {
        return Err(format!("identity was rewritten: {active:?}"));
    }
    Ok(())
}

fn unset_identity_may_be_filled<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut case = insert(s, &host_case("node1", "sdb"))?;
    case.state = CaseState::NewDetail;
    let mut case = s.supersede_active(&case).map_err(|e| e.to_string())?;
    case.resource_id = Some(7);
    case.cluster_id = Some("c1".to_string());
    s.update_active(&case).map_err(|e| e.to_string())?;
    Ok(())
}

fn negative_weight_rejected<S: CaseStore>(s: &S) -> Result<(), String> {
    let mut case = insert(s, &host_case("node1", "sdb"))?;
    case.resource_weight = Some(-1.0);
    match s.update_active(&case) {
        Err(StorageError::InvalidRecord(_)) => Ok(()),
        other => Err(format!("expected InvalidRecord, got {other:?}")),
    }
}

fn negative_resource_id_rejected<S: CaseStore>(s: &S) -> Result<(), String> {
    match s.insert_case(&host_case("node1", "sdb").with_resource(-3, "c1")) {
        Err(StorageError::InvalidRecord(_)) => Ok(()),
        other => Err(format!("expected InvalidRecord, got {other:?}")),
    }
}

fn update_without_case_id_rejected<S: CaseStore>(s: &S) -> Result<(), String> {
    match s.update_active(&host_case("node1", "sdb")) {
        Err(StorageError::InvalidRecord(_)) => Ok(()),
        other => Err(format!("expected InvalidRecord, got {other:?}")),
    }
}
