//! End-to-end lifecycle scenarios against the SQLite store.

mod common;

use common::{harness, sdb_probe};
use dlc_core::{
    Case, CaseError, CaseState, DiagnosticStatus, IdentityConstraint, IdentityKey, SaveMode,
};

// ──────────────────────────────────────────────
// Opening and loading
// ──────────────────────────────────────────────

#[test]
fn new_case_advances_to_new_detail_with_resolved_identity() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();

    let stored = h.engine.progress_case(id).unwrap().unwrap();
    assert_eq!(stored.state, CaseState::NewDetail);
    assert_eq!(stored.version_number, 2);
    assert_eq!(stored.resource_id, Some(7));
    assert_eq!(stored.cluster_id.as_deref(), Some("c1"));
    assert_eq!(stored.device_path.as_deref(), Some("sdb"));

    let history = h.repo().history(id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state, CaseState::New);
    assert_eq!(history[0].resource_id, None);
}

#[test]
fn second_case_for_the_same_device_is_rejected() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let first = h.open_sdb();

    let err = h
        .repo()
        .create(&Case::open().with_host_device("node1", "sdb"))
        .unwrap_err();
    assert!(matches!(
        err,
        CaseError::DuplicateActiveCase {
            constraint: IdentityConstraint::HostDevice,
            ..
        }
    ));

    let winner = h
        .repo()
        .find_active(&IdentityKey::HostDevice {
            hostname: "node1".to_string(),
            device_path: "sdb".to_string(),
        })
        .unwrap()
        .unwrap();
    assert_eq!(winner.case_id, Some(first));
    assert_eq!(h.repo().list_active(None).unwrap().len(), 1);
}

#[test]
fn loading_an_unknown_case_fails() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    assert!(matches!(
        h.repo().load(999_999_999),
        Err(CaseError::CaseNotFound {
            case_id: 999_999_999,
            ..
        })
    ));
}

#[test]
fn n_saves_leave_n_history_rows() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();
    let mut case = h.repo().load(id).unwrap();
    for _ in 0..4 {
        case = h.repo().save(&case, SaveMode::NewVersion).unwrap();
    }
    assert_eq!(h.repo().load(id).unwrap().version_number, 5);
    let versions: Vec<i64> = h
        .repo()
        .history(id)
        .unwrap()
        .iter()
        .map(|c| c.version_number)
        .collect();
    assert_eq!(versions, vec![1, 2, 3, 4]);
}

#[test]
fn saved_case_round_trips() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();
    let stored = h.engine.progress_case(id).unwrap().unwrap();
    assert_eq!(h.repo().load(id).unwrap(), stored);
    assert_eq!(h.repo().load_version(id, 2).unwrap(), stored);
}

// ──────────────────────────────────────────────
// Full lifecycles
// ──────────────────────────────────────────────

#[test]
fn healthy_drive_is_tested_and_rebuilt() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();
    h.health.set_clean(false);

    assert_eq!(h.step(id), "NEW_DETAIL");
    assert_eq!(h.step(id), "RECOVERY_WAIT");
    assert_eq!(
        h.admin.calls(),
        vec!["stop 7", "reweight 7 0", "out 7"],
        "preparation runs stop, drain and mark-out in order"
    );
    assert_eq!(h.step(id), "<no write>");
    let waiting = h.repo().load(id).unwrap();
    assert_eq!(waiting.version_number, 3);
    assert_eq!(waiting.resource_weight, Some(0.0));

    h.health.set_clean(true);
    assert_eq!(h.step(id), "RESOURCE_REMOVED");
    assert_eq!(h.step(id), "DRIVE_TESTING");
    assert_eq!(h.step(id), "TEST_DONE");
    assert_eq!(h.step(id), "REBUILD_RESOURCE");
    assert_eq!(h.step(id), "RESOLVED");
    assert_eq!(h.step(id), "<no write>");

    let states: Vec<CaseState> = h
        .repo()
        .history(id)
        .unwrap()
        .iter()
        .map(|c| c.state)
        .collect();
    assert_eq!(
        states,
        vec![
            CaseState::New,
            CaseState::NewDetail,
            CaseState::RecoveryWait,
            CaseState::RecoveryDone,
            CaseState::ResourceRemoved,
            CaseState::DriveTesting,
            CaseState::TestDone,
            CaseState::RebuildResource,
        ]
    );
    let resolved = h.repo().load(id).unwrap();
    assert_eq!(resolved.version_number, 9);
    assert_eq!(resolved.host_serial.as_deref(), Some("SN-NODE1"));
    assert!(h
        .admin
        .calls()
        .contains(&"remove 7 replace=true zap=false".to_string()));
}

#[test]
fn failed_drive_goes_through_replacement() {
    let h = harness(sdb_probe(DiagnosticStatus::Fail));
    let id = h.open_sdb();

    let mut seen = Vec::new();
    for _ in 0..8 {
        seen.push(h.step(id));
    }
    assert_eq!(
        seen,
        vec![
            "NEW_DETAIL",
            "RECOVERY_WAIT",
            "RESOURCE_REMOVED",
            "REPLACE_RESOURCE",
            "WAIT_FOR_REPLACEMENT",
            "REBUILD_RESOURCE",
            "RESOLVED",
            "<no write>",
        ]
    );
    assert_eq!(
        h.repo().load(id).unwrap().diagnostic,
        DiagnosticStatus::Fail
    );
}
