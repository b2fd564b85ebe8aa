//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use dlc_core::{
    AdminAction, AdminError, AdminExecutor, Case, CaseRepository, Collaborators, DiagnosticStatus,
    EngineConfig, HostIdentity, ProgressionEngine, RemovalOptions, ResourceRecord, ResourceRef,
    SqliteCaseStore, StaticHealthOracle, StaticInventory, StaticProbe,
};

/// Admin executor that records every call and can be told to fail one action.
#[derive(Default)]
pub struct RecordingAdmin {
    calls: Mutex<Vec<String>>,
    fail_on: Mutex<Option<AdminAction>>,
}

impl RecordingAdmin {
    pub fn fail_on(&self, action: AdminAction) {
        *self.fail_on.lock().unwrap() = Some(action);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, action: AdminAction, call: String) -> Result<(), AdminError> {
        self.calls.lock().unwrap().push(call);
        if *self.fail_on.lock().unwrap() == Some(action) {
            return Err(AdminError::new(action, "exit status 22"));
        }
        Ok(())
    }
}

impl AdminExecutor for RecordingAdmin {
    fn stop_daemon(&self, resource: &ResourceRef) -> Result<(), AdminError> {
        self.record(
            AdminAction::StopDaemon,
            format!("stop {}", resource.resource_id),
        )
    }

    fn reweight(&self, resource: &ResourceRef, weight: f64) -> Result<(), AdminError> {
        self.record(
            AdminAction::Reweight,
            format!("reweight {} {weight}", resource.resource_id),
        )
    }

    fn mark_out(&self, resource: &ResourceRef) -> Result<(), AdminError> {
        self.record(
            AdminAction::MarkOut,
            format!("out {}", resource.resource_id),
        )
    }

    fn remove_resource(
        &self,
        resource: &ResourceRef,
        options: &RemovalOptions,
    ) -> Result<(), AdminError> {
        self.record(
            AdminAction::RemoveResource,
            format!(
                "remove {} replace={} zap={}",
                resource.resource_id, options.replace, options.zap
            ),
        )
    }
}

pub struct Harness {
    pub engine: ProgressionEngine<SqliteCaseStore>,
    pub admin: Arc<RecordingAdmin>,
    pub health: Arc<StaticHealthOracle>,
}

impl Harness {
    pub fn repo(&self) -> &CaseRepository<SqliteCaseStore> {
        self.engine.repository()
    }

    /// Open the `node1:sdb` case and return its id.
    pub fn open_sdb(&self) -> i64 {
        self.repo()
            .create(&Case::open().with_host_device("node1", "/dev/sdb"))
            .unwrap()
            .case_id
            .unwrap()
    }

    /// Progress `case_id` and return the stored state name.
    pub fn step(&self, case_id: i64) -> String {
        self.engine
            .progress_case(case_id)
            .unwrap()
            .map(|c| c.state.to_string())
            .unwrap_or_else(|| "<no write>".to_string())
    }
}

pub fn sdb_record() -> ResourceRecord {
    ResourceRecord {
        resource_id: 7,
        hostname: "node1".to_string(),
        device_path: "/dev/sdb".to_string(),
        weight: 1.819,
        mount_point: Some("/var/lib/ceph/osd/ceph-7".to_string()),
        cluster_id: "c1".to_string(),
    }
}

pub fn sdb_probe(status: DiagnosticStatus) -> StaticProbe {
    StaticProbe::new().with_result("sdb", status)
}

/// Engine on an in-memory SQLite store, running as `node1` in cluster `c1`
/// with a clean cluster.
pub fn harness(probe: StaticProbe) -> Harness {
    harness_for(HostIdentity::new("node1", "SN-NODE1", "c1"), probe)
}

pub fn harness_for(host: HostIdentity, probe: StaticProbe) -> Harness {
    let admin = Arc::new(RecordingAdmin::default());
    let health = Arc::new(StaticHealthOracle::new(true));
    let inventory = StaticInventory::new(vec![sdb_record()]).with_local_host(host.hostname.clone());
    let collaborators = Collaborators {
        inventory: Arc::new(inventory),
        health: health.clone(),
        probe: Arc::new(probe),
        admin: admin.clone(),
    };
    let repo = CaseRepository::new(SqliteCaseStore::in_memory().unwrap());
    Harness {
        engine: ProgressionEngine::new(repo, collaborators, host, EngineConfig::default()),
        admin,
        health,
    }
}
