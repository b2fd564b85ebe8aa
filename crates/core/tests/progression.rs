//! Progression engine edge cases: parking, escalation, and failures that
//! must leave the store untouched.

mod common;

use common::{harness, harness_for, sdb_probe};
use dlc_core::{
    AdminAction, Case, CaseError, CaseOperator, CaseRepository, CaseState, DiagnosticStatus,
    HostIdentity, MemoryCaseStore, SaveMode, StaticProbe,
};

// ──────────────────────────────────────────────
// Parked states
// ──────────────────────────────────────────────

#[test]
fn resolved_case_is_never_written_again() {
    let h = harness(sdb_probe(DiagnosticStatus::Fail));
    let id = h.open_sdb();
    while h.step(id) != "<no write>" {}
    let resolved = h.repo().load(id).unwrap();
    assert_eq!(resolved.state, CaseState::Resolved);

    for _ in 0..3 {
        assert!(h.engine.progress_case(id).unwrap().is_none());
    }
    assert_eq!(h.repo().load(id).unwrap(), resolved);
    assert_eq!(
        h.repo().history(id).unwrap().len() as i64,
        resolved.version_number - 1
    );
}

#[test]
fn operator_needed_is_parked_without_reconciling() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    // Not in the inventory: reconciliation would fail if it ran.
    let id = h
        .repo()
        .create(&Case::open().with_host_device("node1", "sdq"))
        .unwrap()
        .case_id
        .unwrap();
    CaseOperator::new(h.repo()).escalate(id).unwrap();

    assert!(h.engine.progress_case(id).unwrap().is_none());
    assert_eq!(h.repo().load(id).unwrap().version_number, 2);
}

// ──────────────────────────────────────────────
// Escalation
// ──────────────────────────────────────────────

#[test]
fn failed_stop_escalates_and_persists() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();
    h.step(id);
    h.admin.fail_on(AdminAction::StopDaemon);

    let err = h.engine.progress_case(id).unwrap_err();
    assert!(matches!(
        err,
        CaseError::AdminActionFailed {
            state: CaseState::NewDetail,
            action: AdminAction::StopDaemon,
            ..
        }
    ));
    assert_eq!(err.case_id(), Some(id));

    let parked = h.repo().load(id).unwrap();
    assert_eq!(parked.state, CaseState::OperatorNeeded);
    assert_eq!(parked.version_number, 3);
    assert_eq!(h.admin.calls(), vec!["stop 7"]);
}

#[test]
fn failed_mark_out_escalates_after_drain() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();
    h.step(id);
    h.admin.fail_on(AdminAction::MarkOut);

    assert!(matches!(
        h.engine.progress_case(id),
        Err(CaseError::AdminActionFailed {
            action: AdminAction::MarkOut,
            ..
        })
    ));
    let parked = h.repo().load(id).unwrap();
    assert_eq!(parked.state, CaseState::OperatorNeeded);
    assert_eq!(parked.resource_weight, Some(0.0));
}

#[test]
fn failed_removal_escalates_from_recovery_done() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();
    h.step(id);
    h.step(id);
    h.admin.fail_on(AdminAction::RemoveResource);

    assert!(matches!(
        h.engine.progress_case(id),
        Err(CaseError::AdminActionFailed {
            state: CaseState::RecoveryDone,
            action: AdminAction::RemoveResource,
            ..
        })
    ));
    let states: Vec<CaseState> = h
        .repo()
        .history(id)
        .unwrap()
        .iter()
        .map(|c| c.state)
        .collect();
    assert_eq!(states.last(), Some(&CaseState::RecoveryDone));
    assert_eq!(h.repo().load(id).unwrap().state, CaseState::OperatorNeeded);
}

#[test]
fn unknown_diagnostic_after_removal_needs_an_operator() {
    let h = harness(StaticProbe::new());
    let id = h.open_sdb();
    assert_eq!(h.step(id), "NEW_DETAIL");
    assert_eq!(h.step(id), "RECOVERY_WAIT");
    assert_eq!(h.step(id), "RESOURCE_REMOVED");
    assert_eq!(h.step(id), "OPERATOR_NEEDED");
}

// ──────────────────────────────────────────────
// Failures that write nothing
// ──────────────────────────────────────────────

#[test]
fn unresolvable_case_is_left_untouched() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let created = h
        .repo()
        .create(&Case::open().with_host_device("node1", "sdz"))
        .unwrap();
    let id = created.case_id.unwrap();

    assert!(matches!(
        h.engine.progress_case(id),
        Err(CaseError::ResourceNotResolved { .. })
    ));
    assert_eq!(h.repo().load(id).unwrap(), created);
    assert!(h.repo().history(id).unwrap().is_empty());
}

#[test]
fn case_on_another_host_is_rejected() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();
    h.step(id);

    let elsewhere = harness_for(
        HostIdentity::new("node2", "SN-NODE2", "c1"),
        sdb_probe(DiagnosticStatus::Pass),
    );
    let case = h.repo().load(id).unwrap();
    assert!(matches!(
        elsewhere.engine.progress(case.clone()),
        Err(CaseError::HostAffinityViolation { .. })
    ));
    assert_eq!(h.repo().load(id).unwrap(), case);
    assert!(elsewhere.admin.calls().is_empty());
}

#[test]
fn case_in_another_cluster_is_rejected() {
    let h = harness_for(
        HostIdentity::new("node1", "SN-NODE1", "c2"),
        sdb_probe(DiagnosticStatus::Pass),
    );
    let id = h.open_sdb();
    assert!(matches!(
        h.engine.progress_case(id),
        Err(CaseError::ClusterAffinityViolation { .. })
    ));
    assert_eq!(h.repo().load(id).unwrap().version_number, 1);
}

/// Walk `id` to DRIVE_TESTING through the operator path, with `diagnostic`
/// cached on the active row.
fn park_in_drive_testing(h: &common::Harness, id: i64, diagnostic: DiagnosticStatus) -> Case {
    let op = CaseOperator::new(h.repo());
    op.escalate(id).unwrap();
    let mut testing = op.override_state(id, CaseState::DriveTesting).unwrap();
    testing.diagnostic = diagnostic;
    h.repo().save(&testing, SaveMode::InPlace).unwrap()
}

#[test]
fn drive_testing_with_cached_result_advances_while_probe_is_down() {
    let h = harness(StaticProbe::new());
    let id = h.open_sdb();
    h.step(id);
    let testing = park_in_drive_testing(&h, id, DiagnosticStatus::Pass);

    let done = h.engine.progress_case(id).unwrap().unwrap();
    assert_eq!(done.state, CaseState::TestDone);
    assert_eq!(done.version_number, testing.version_number + 1);
    assert_eq!(done.diagnostic, DiagnosticStatus::Pass);
}

#[test]
fn drive_testing_keeps_a_cached_result() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();
    h.step(id);
    park_in_drive_testing(&h, id, DiagnosticStatus::Fail);

    assert_eq!(h.step(id), "TEST_DONE");
    assert_eq!(h.repo().load(id).unwrap().diagnostic, DiagnosticStatus::Fail);
    assert_eq!(h.step(id), "REPLACE_RESOURCE");
}

#[test]
fn drive_testing_without_result_hands_off_after_test_done() {
    let h = harness(StaticProbe::new());
    let id = h.open_sdb();
    h.step(id);
    park_in_drive_testing(&h, id, DiagnosticStatus::Unknown);

    assert_eq!(h.step(id), "TEST_DONE");
    assert_eq!(h.repo().load(id).unwrap().diagnostic, DiagnosticStatus::Unknown);
    assert_eq!(h.step(id), "OPERATOR_NEEDED");
}

#[test]
fn identity_stays_frozen_after_operator_returns_case_to_new() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();
    assert_eq!(h.step(id), "NEW_DETAIL");
    let op = CaseOperator::new(h.repo());
    op.escalate(id).unwrap();
    let mut reopened = op.override_state(id, CaseState::New).unwrap();

    reopened.hostname = Some("node9".to_string());
    reopened.device_path = Some("sdz".to_string());
    reopened.resource_id = Some(99);
    assert!(matches!(
        h.repo().save(&reopened, SaveMode::InPlace),
        Err(CaseError::IdentityChanged { .. })
    ));

    let active = h.repo().load(id).unwrap();
    assert_eq!(active.hostname.as_deref(), Some("node1"));
    assert_eq!(active.device_path.as_deref(), Some("sdb"));
    assert_eq!(active.resource_id, Some(7));
}

#[test]
fn moved_host_serial_is_rejected() {
    let h = harness(sdb_probe(DiagnosticStatus::Pass));
    let id = h.open_sdb();
    h.step(id);
    h.step(id);

    let swapped = harness_for(
        HostIdentity::new("node1", "SN-REPLACED", "c1"),
        sdb_probe(DiagnosticStatus::Pass),
    );
    let case = h.repo().load(id).unwrap();
    assert!(matches!(
        swapped.engine.progress(case),
        Err(CaseError::HostSerialMismatch { .. })
    ));
}

// ──────────────────────────────────────────────
// Escape universality
// ──────────────────────────────────────────────

#[test]
fn every_non_terminal_state_can_be_escalated() {
    let repo = CaseRepository::new(MemoryCaseStore::new());
    let op = CaseOperator::new(&repo);
    for (n, state) in CaseState::ALL.into_iter().enumerate() {
        if state.is_terminal() {
            continue;
        }
        let id = repo
            .create(&Case::open().with_host_device("node1", &format!("sd{n}")))
            .unwrap()
            .case_id
            .unwrap();
        op.escalate(id).unwrap();
        op.override_state(id, state).unwrap();
        let escalated = op.escalate(id).unwrap();
        assert_eq!(escalated.state, CaseState::OperatorNeeded, "from {state}");
    }
}
