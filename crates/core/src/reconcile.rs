//! Identity resolution against the inventory.
//!
//! Reconciliation refreshes the cached attributes of a case from the
//! inventory and checks that the case belongs on this host. It only ever
//! touches the in-memory case, and only when it succeeds: a failed
//! reconciliation leaves the case exactly as it was and is never escalated.

use std::sync::Arc;

use dlc_storage::{normalize_device_path, Case, CaseState, DiagnosticStatus};

use crate::collaborators::{DiagnosticProbe, InventoryService, LookupScope};
use crate::error::CaseError;
use crate::host::HostIdentity;

pub struct Reconciler {
    inventory: Arc<dyn InventoryService>,
    probe: Arc<dyn DiagnosticProbe>,
    host: HostIdentity,
}

impl Reconciler {
    pub fn new(
        inventory: Arc<dyn InventoryService>,
        probe: Arc<dyn DiagnosticProbe>,
        host: HostIdentity,
    ) -> Self {
        Self {
            inventory,
            probe,
            host,
        }
    }

    pub fn host(&self) -> &HostIdentity {
        &self.host
    }

    /// Refresh `case` from the inventory. Returns whether any field changed.
    pub fn reconcile(&self, case: &mut Case) -> Result<bool, CaseError> {
        let key = case
            .identity_key()
            .ok_or(CaseError::IncompleteIdentity {
                case_id: case.case_id,
            })?;

        let past_new = case.state != CaseState::New;
        let scope = if past_new {
            self.check_host(case)?;
            LookupScope::Local
        } else {
            LookupScope::Global
        };

        let record = self
            .inventory
            .lookup(&key, scope)
            .map_err(|e| CaseError::Collaborator {
                case_id: case.case_id,
                service: "inventory",
                message: e.to_string(),
            })?
            .ok_or_else(|| CaseError::ResourceNotResolved {
                case_id: case.case_id,
                key: key.clone(),
            })?;

        let mut next = case.clone();
        next.hostname = Some(record.hostname);
        next.device_path = Some(normalize_device_path(&record.device_path));
        next.resource_id = Some(record.resource_id);
        next.resource_weight = Some(record.weight);
        next.mount_point = record.mount_point;
        if next.cluster_id.is_none() {
            next.cluster_id = Some(record.cluster_id);
        }

        if past_new {
            if case.identity_conflicts_with(&next) {
                return Err(CaseError::IdentityChanged {
                    case_id: case.case_id,
                    detail: format!(
                        "inventory now reports {} for {key}",
                        next.identity_key()
                            .map(|k| k.to_string())
                            .unwrap_or_default()
                    ),
                });
            }
            self.check_serial(&mut next)?;
            self.refresh_diagnostic(&mut next);
        }

        let changed = next != *case;
        if changed {
            tracing::debug!(case_id = case.case_id, state = %case.state, "reconciled case attributes");
        }
        *case = next;
        Ok(changed)
    }

    /// An unset hostname counts as a mismatch.
    fn check_host(&self, case: &Case) -> Result<(), CaseError> {
        if case.hostname.as_deref() == Some(self.host.hostname.as_str()) {
            return Ok(());
        }
        Err(CaseError::HostAffinityViolation {
            case_id: case.case_id,
            expected: self.host.hostname.clone(),
            actual: case.hostname.clone(),
        })
    }

    fn check_serial(&self, case: &mut Case) -> Result<(), CaseError> {
        match &case.host_serial {
            None => {
                case.host_serial = Some(self.host.host_serial.clone());
                Ok(())
            }
            Some(recorded) if *recorded == self.host.host_serial => Ok(()),
            Some(recorded) => Err(CaseError::HostSerialMismatch {
                case_id: case.case_id,
                recorded: recorded.clone(),
                actual: self.host.host_serial.clone(),
            }),
        }
    }

    /// An unavailable probe leaves the diagnostic `Unknown`.
    fn refresh_diagnostic(&self, case: &mut Case) {
        if case.diagnostic != DiagnosticStatus::Unknown {
            return;
        }
        let Some(device) = case.device_path.as_deref() else {
            return;
        };
        match self.probe.run(device) {
            Ok(status) => case.diagnostic = status,
            Err(e) => tracing::warn!(case_id = case.case_id, error = %e, "diagnostic probe unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ResourceRecord, StaticInventory, StaticProbe};

    fn record() -> ResourceRecord {
        ResourceRecord {
            resource_id: 7,
            hostname: "node1".into(),
            device_path: "/dev/sdb".into(),
            weight: 1.82,
            mount_point: Some("/var/lib/ceph/osd/ceph-7".into()),
            cluster_id: "c1".into(),
        }
    }

    fn reconciler(records: Vec<ResourceRecord>, probe: StaticProbe) -> Reconciler {
        Reconciler::new(
            Arc::new(StaticInventory::new(records).with_local_host("node1")),
            Arc::new(probe),
            HostIdentity::new("node1", "SN-1", "c1"),
        )
    }

    fn past_new() -> Case {
        let mut case = Case::open().with_host_device("node1", "sdb");
        case.case_id = Some(1);
        case.state = CaseState::NewDetail;
        case
    }

    #[test]
    fn new_case_picks_up_inventory_attributes() {
        let r = reconciler(vec![record()], StaticProbe::new());
        let mut case = Case::open().with_host_device("node1", "sdb");
        assert!(r.reconcile(&mut case).unwrap());
        assert_eq!(case.resource_id, Some(7));
        assert_eq!(case.cluster_id.as_deref(), Some("c1"));
        assert_eq!(case.resource_weight, Some(1.82));
        // NEW cases are neither probed nor serial-stamped.
        assert_eq!(case.diagnostic, DiagnosticStatus::Unknown);
        assert_eq!(case.host_serial, None);
    }

    #[test]
    fn second_reconcile_reports_no_change() {
        let r = reconciler(vec![record()], StaticProbe::new());
        let mut case = Case::open().with_host_device("node1", "sdb");
        r.reconcile(&mut case).unwrap();
        assert!(!r.reconcile(&mut case).unwrap());
    }

    #[test]
    fn unresolved_identity_leaves_case_untouched() {
        let r = reconciler(vec![], StaticProbe::new());
        let mut case = Case::open().with_host_device("node1", "sdz");
        let before = case.clone();
        assert!(matches!(
            r.reconcile(&mut case),
            Err(CaseError::ResourceNotResolved { .. })
        ));
        assert_eq!(case, before);
    }

    #[test]
    fn incomplete_identity_is_rejected() {
        let r = reconciler(vec![record()], StaticProbe::new());
        let mut case = Case::open();
        case.hostname = Some("node1".into());
        assert!(matches!(
            r.reconcile(&mut case),
            Err(CaseError::IncompleteIdentity { .. })
        ));
    }

    #[test]
    fn foreign_host_is_rejected_past_new() {
        let r = reconciler(vec![record()], StaticProbe::new());
        let mut case = past_new();
        case.hostname = Some("node9".into());
        assert!(matches!(
            r.reconcile(&mut case),
            Err(CaseError::HostAffinityViolation { .. })
        ));
    }

    #[test]
    fn unset_hostname_is_a_host_mismatch() {
        let r = reconciler(vec![record()], StaticProbe::new());
        let mut case = Case::open().with_resource(7, "c1");
        case.state = CaseState::NewDetail;
        assert!(matches!(
            r.reconcile(&mut case),
            Err(CaseError::HostAffinityViolation { actual: None, .. })
        ));
    }

    #[test]
    fn past_new_captures_serial_and_probes() {
        let probe = StaticProbe::new().with_result("sdb", DiagnosticStatus::Fail);
        let r = reconciler(vec![record()], probe);
        let mut case = past_new();
        r.reconcile(&mut case).unwrap();
        assert_eq!(case.host_serial.as_deref(), Some("SN-1"));
        assert_eq!(case.diagnostic, DiagnosticStatus::Fail);
    }

    #[test]
    fn unavailable_probe_keeps_diagnostic_unknown() {
        let r = reconciler(vec![record()], StaticProbe::new());
        let mut case = past_new();
        r.reconcile(&mut case).unwrap();
        assert_eq!(case.diagnostic, DiagnosticStatus::Unknown);
    }

    #[test]
    fn serial_mismatch_is_rejected() {
        let r = reconciler(vec![record()], StaticProbe::new());
        let mut case = past_new();
        case.host_serial = Some("SN-OTHER".into());
        assert!(matches!(
            r.reconcile(&mut case),
            Err(CaseError::HostSerialMismatch { .. })
        ));
    }

    #[test]
    fn changed_resource_id_past_new_is_an_identity_change() {
        let mut moved = record();
        moved.resource_id = 8;
        let r = reconciler(vec![moved], StaticProbe::new());
        let mut case = past_new().with_resource(7, "c1");
        let before = case.clone();
        assert!(matches!(
            r.reconcile(&mut case),
            Err(CaseError::IdentityChanged { .. })
        ));
        assert_eq!(case, before);
    }
}
