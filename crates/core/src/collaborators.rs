//! Interfaces to the outside world the engines consume, and static
//! implementations for fixtures and embedding.
//!
//! The engines hold these as `Arc<dyn ...>` and never know how a lookup or
//! an admin command is carried out.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use dlc_storage::{normalize_device_path, DiagnosticStatus, IdentityKey};
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// A collaborator could not answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("probe unavailable for {device_path}: {reason}")]
    Unavailable { device_path: String, reason: String },
}

/// The admin command that was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    StopDaemon,
    Reweight,
    MarkOut,
    RemoveResource,
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdminAction::StopDaemon => "stop daemon",
            AdminAction::Reweight => "reweight",
            AdminAction::MarkOut => "mark out",
            AdminAction::RemoveResource => "remove resource",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{action} failed: {message}")]
pub struct AdminError {
    pub action: AdminAction,
    pub message: String,
}

impl AdminError {
    pub fn new(action: AdminAction, message: impl Into<String>) -> Self {
        Self {
            action,
            message: message.into(),
        }
    }
}

// ──────────────────────────────────────────────
// Inventory
// ──────────────────────────────────────────────

/// Whether a lookup may return resources living on other hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupScope {
    /// Cluster-wide; used while a case is still `NEW`.
    Global,
    /// Restricted to the host the engine runs on.
    Local,
}

/// Current attributes of one resource as the inventory reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub resource_id: i64,
    pub hostname: String,
    pub device_path: String,
    pub weight: f64,
    pub mount_point: Option<String>,
    pub cluster_id: String,
}

impl ResourceRecord {
    fn matches(&self, key: &IdentityKey) -> bool {
        match key {
            IdentityKey::HostDevice {
                hostname,
                device_path,
            } => {
                self.hostname == *hostname
                    && normalize_device_path(&self.device_path) == normalize_device_path(device_path)
            }
            IdentityKey::ResourceCluster {
                resource_id,
                cluster_id,
            } => self.resource_id == *resource_id && self.cluster_id == *cluster_id,
        }
    }
}

/// Identity → current resource attributes.
pub trait InventoryService: Send + Sync {
    /// Resolve `key`. `Ok(None)` means the inventory answered and knows no
    /// such resource.
    fn lookup(
        &self,
        key: &IdentityKey,
        scope: LookupScope,
    ) -> Result<Option<ResourceRecord>, CollaboratorError>;
}

/// An inventory over a fixed list of records.
///
/// Local lookups only see records whose hostname equals the configured
/// local host; with no local host set, both scopes see everything.
pub struct StaticInventory {
    records: Vec<ResourceRecord>,
    local_host: Option<String>,
}

impl StaticInventory {
    pub fn new(records: Vec<ResourceRecord>) -> Self {
        Self {
            records,
            local_host: None,
        }
    }

    pub fn with_local_host(mut self, hostname: impl Into<String>) -> Self {
        self.local_host = Some(hostname.into());
        self
    }
}

impl InventoryService for StaticInventory {
    fn lookup(
        &self,
        key: &IdentityKey,
        scope: LookupScope,
    ) -> Result<Option<ResourceRecord>, CollaboratorError> {
        let visible = |r: &&ResourceRecord| match (scope, &self.local_host) {
            (LookupScope::Local, Some(local)) => r.hostname == *local,
            _ => true,
        };
        Ok(self
            .records
            .iter()
            .filter(visible)
            .find(|r| r.matches(key))
            .cloned())
    }
}

// ──────────────────────────────────────────────
// Health oracle
// ──────────────────────────────────────────────

/// Answers whether the cluster has fully recovered.
pub trait HealthOracle: Send + Sync {
    fn is_clean(&self) -> Result<bool, CollaboratorError>;
}

/// A health oracle whose answer is set by hand.
pub struct StaticHealthOracle {
    clean: AtomicBool,
}

impl StaticHealthOracle {
    pub fn new(clean: bool) -> Self {
        Self {
            clean: AtomicBool::new(clean),
        }
    }

    pub fn set_clean(&self, clean: bool) {
        self.clean.store(clean, Ordering::SeqCst);
    }
}

impl HealthOracle for StaticHealthOracle {
    fn is_clean(&self) -> Result<bool, CollaboratorError> {
        Ok(self.clean.load(Ordering::SeqCst))
    }
}

// ──────────────────────────────────────────────
// Diagnostic probe
// ──────────────────────────────────────────────

/// Physical media health of one device.
pub trait DiagnosticProbe: Send + Sync {
    fn run(&self, device_path: &str) -> Result<DiagnosticStatus, ProbeError>;
}

/// A probe with canned results per device. Devices without a result are
/// reported as unavailable.
#[derive(Default)]
pub struct StaticProbe {
    results: HashMap<String, DiagnosticStatus>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, device_path: &str, status: DiagnosticStatus) -> Self {
        self.results
            .insert(normalize_device_path(device_path), status);
        self
    }
}

impl DiagnosticProbe for StaticProbe {
    fn run(&self, device_path: &str) -> Result<DiagnosticStatus, ProbeError> {
        self.results
            .get(&normalize_device_path(device_path))
            .copied()
            .ok_or_else(|| ProbeError::Unavailable {
                device_path: device_path.to_string(),
                reason: "no result recorded".to_string(),
            })
    }
}

// ──────────────────────────────────────────────
// Admin executor
// ──────────────────────────────────────────────

/// The resource an admin command targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub resource_id: i64,
    pub cluster_id: String,
    pub hostname: String,
    pub device_path: String,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resource {} ({}:{}) in cluster {}",
            self.resource_id, self.hostname, self.device_path, self.cluster_id
        )
    }
}

/// Flags passed through to the removal command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalOptions {
    /// Keep the resource id reserved for the replacement disk.
    pub replace: bool,
    /// Wipe the device after removal.
    pub zap: bool,
}

impl Default for RemovalOptions {
    fn default() -> Self {
        Self {
            replace: true,
            zap: false,
        }
    }
}

/// Cluster administration commands.
pub trait AdminExecutor: Send + Sync {
    fn stop_daemon(&self, resource: &ResourceRef) -> Result<(), AdminError>;
    fn reweight(&self, resource: &ResourceRef, weight: f64) -> Result<(), AdminError>;
    fn mark_out(&self, resource: &ResourceRef) -> Result<(), AdminError>;
    fn remove_resource(
        &self,
        resource: &ResourceRef,
        options: &RemovalOptions,
    ) -> Result<(), AdminError>;
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(resource_id: i64, hostname: &str, device: &str) -> ResourceRecord {
        ResourceRecord {
            resource_id,
            hostname: hostname.to_string(),
            device_path: device.to_string(),
            weight: 1.8,
            mount_point: Some(format!("/var/lib/ceph/osd/ceph-{resource_id}")),
            cluster_id: "c1".to_string(),
        }
    }

    #[test]
    fn static_inventory_matches_either_key() {
        let inv = StaticInventory::new(vec![record(7, "node1", "/dev/sdb")]);
        let by_host = IdentityKey::HostDevice {
            hostname: "node1".into(),
            device_path: "sdb".into(),
        };
        let by_resource = IdentityKey::ResourceCluster {
            resource_id: 7,
            cluster_id: "c1".into(),
        };
        assert_eq!(
            inv.lookup(&by_host, LookupScope::Global)
                .unwrap()
                .map(|r| r.resource_id),
            Some(7)
        );
        assert!(inv
            .lookup(&by_resource, LookupScope::Global)
            .unwrap()
            .is_some());
    }

    #[test]
    fn local_scope_hides_other_hosts() {
        let inv = StaticInventory::new(vec![record(7, "node2", "sdb")]).with_local_host("node1");
        let key = IdentityKey::ResourceCluster {
            resource_id: 7,
            cluster_id: "c1".into(),
        };
        assert!(inv.lookup(&key, LookupScope::Global).unwrap().is_some());
        assert!(inv.lookup(&key, LookupScope::Local).unwrap().is_none());
    }

    #[test]
    fn static_probe_reports_missing_devices_unavailable() {
        let probe = StaticProbe::new().with_result("/dev/sdb", DiagnosticStatus::Fail);
        assert_eq!(probe.run("sdb").unwrap(), DiagnosticStatus::Fail);
        assert!(matches!(
            probe.run("sdc"),
            Err(ProbeError::Unavailable { .. })
        ));
    }

    #[test]
    fn health_oracle_answer_can_change() {
        let oracle = StaticHealthOracle::new(false);
        assert!(!oracle.is_clean().unwrap());
        oracle.set_clean(true);
        assert!(oracle.is_clean().unwrap());
    }

    #[test]
    fn removal_defaults_keep_the_id_for_replacement() {
        let opts = RemovalOptions::default();
        assert!(opts.replace);
        assert!(!opts.zap);
    }
}
