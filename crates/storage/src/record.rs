use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a remediation case.
///
/// The canonical text form (`"NEW_DETAIL"`, ...) is what the Store persists;
/// the schema rejects any other value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseState {
    New,
    NewDetail,
    RecoveryWait,
    RecoveryDone,
    ResourceRemoved,
    DriveTesting,
    TestDone,
    ReplaceResource,
    WaitForReplacement,
    RebuildResource,
    Resolved,
    OperatorNeeded,
}

impl CaseState {
    /// Every state, in intended lifecycle order, escape state last.
    pub const ALL: [CaseState; 12] = [
        CaseState::New,
        CaseState::NewDetail,
        CaseState::RecoveryWait,
        CaseState::RecoveryDone,
        CaseState::ResourceRemoved,
        CaseState::DriveTesting,
        CaseState::TestDone,
        CaseState::ReplaceResource,
        CaseState::WaitForReplacement,
        CaseState::RebuildResource,
        CaseState::Resolved,
        CaseState::OperatorNeeded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CaseState::New => "NEW",
            CaseState::NewDetail => "NEW_DETAIL",
            CaseState::RecoveryWait => "RECOVERY_WAIT",
            CaseState::RecoveryDone => "RECOVERY_DONE",
            CaseState::ResourceRemoved => "RESOURCE_REMOVED",
            CaseState::DriveTesting => "DRIVE_TESTING",
            CaseState::TestDone => "TEST_DONE",
            CaseState::ReplaceResource => "REPLACE_RESOURCE",
            CaseState::WaitForReplacement => "WAIT_FOR_REPLACEMENT",
            CaseState::RebuildResource => "REBUILD_RESOURCE",
            CaseState::Resolved => "RESOLVED",
            CaseState::OperatorNeeded => "OPERATOR_NEEDED",
        }
    }

    /// `RESOLVED` has no outgoing edges.
    pub fn is_terminal(self) -> bool {
        matches!(self, CaseState::Resolved)
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when text does not name a known enumeration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for CaseState {
    type Err = ParseEnumError;

    /// Accepts the canonical form case-insensitively, with `-` or `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        CaseState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| ParseEnumError {
                kind: "case state",
                value: s.to_string(),
            })
    }
}

/// What the case is currently doing. Descriptive only; transition logic
/// never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    None,
    Logging,
    CheckingInfo,
    CheckingSmart,
    TestingDrive,
    ReweightingResource,
    RemovingResource,
    RebuildingResource,
    OperatorHandoff,
}

impl Action {
    const ALL: [Action; 9] = [
        Action::None,
        Action::Logging,
        Action::CheckingInfo,
        Action::CheckingSmart,
        Action::TestingDrive,
        Action::ReweightingResource,
        Action::RemovingResource,
        Action::RebuildingResource,
        Action::OperatorHandoff,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::None => "none",
            Action::Logging => "logging",
            Action::CheckingInfo => "checking_info",
            Action::CheckingSmart => "checking_smart",
            Action::TestingDrive => "testing_drive",
            Action::ReweightingResource => "reweighting_resource",
            Action::RemovingResource => "removing_resource",
            Action::RebuildingResource => "rebuilding_resource",
            Action::OperatorHandoff => "operator_handoff",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "action",
                value: s.to_string(),
            })
    }
}

/// Why the case is blocked, if it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitReason {
    #[default]
    None,
    ClusterHealth,
    DriveTestCompletion,
    DriveReplacement,
}

impl WaitReason {
    const ALL: [WaitReason; 4] = [
        WaitReason::None,
        WaitReason::ClusterHealth,
        WaitReason::DriveTestCompletion,
        WaitReason::DriveReplacement,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WaitReason::None => "none",
            WaitReason::ClusterHealth => "cluster_health",
            WaitReason::DriveTestCompletion => "drive_test_completion",
            WaitReason::DriveReplacement => "drive_replacement",
        }
    }
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaitReason {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WaitReason::ALL
            .iter()
            .copied()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "wait reason",
                value: s.to_string(),
            })
    }
}

/// Cached result of the diagnostic probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStatus {
    #[default]
    Unknown,
    Pass,
    Fail,
}

impl DiagnosticStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticStatus::Unknown => "unknown",
            DiagnosticStatus::Pass => "pass",
            DiagnosticStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for DiagnosticStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagnosticStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(DiagnosticStatus::Unknown),
            "pass" => Ok(DiagnosticStatus::Pass),
            "fail" => Ok(DiagnosticStatus::Fail),
            _ => Err(ParseEnumError {
                kind: "diagnostic status",
                value: s.to_string(),
            }),
        }
    }
}

/// A complete identity pair, used as the addressing key into the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityKey {
    HostDevice {
        hostname: String,
        device_path: String,
    },
    ResourceCluster {
        resource_id: i64,
        cluster_id: String,
    },
}

impl IdentityKey {
    /// The uniqueness constraint this key is guarded by.
    pub fn constraint(&self) -> IdentityConstraint {
        match self {
            IdentityKey::HostDevice { .. } => IdentityConstraint::HostDevice,
            IdentityKey::ResourceCluster { .. } => IdentityConstraint::ResourceCluster,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::HostDevice {
                hostname,
                device_path,
            } => write!(f, "{hostname}:{device_path}"),
            IdentityKey::ResourceCluster {
                resource_id,
                cluster_id,
            } => write!(f, "resource {resource_id} in cluster {cluster_id}"),
        }
    }
}

/// The two active-case uniqueness constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityConstraint {
    /// `(hostname, device_path)` among active cases.
    HostDevice,
    /// `(resource_id, cluster_id)` among active cases.
    ResourceCluster,
}

impl fmt::Display for IdentityConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityConstraint::HostDevice => f.write_str("(hostname, device_path)"),
            IdentityConstraint::ResourceCluster => f.write_str("(resource_id, cluster_id)"),
        }
    }
}

/// Current time as an RFC 3339 UTC string, the format of `Case::recorded_at`.
pub fn now_rfc3339() -> Result<String, time::error::Format> {
    time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339)
}

/// Strip the `/dev/` prefix so `sdb` and `/dev/sdb` address the same device.
pub fn normalize_device_path(path: &str) -> String {
    let trimmed = path.trim();
    trimmed
        .strip_prefix("/dev/")
        .unwrap_or(trimmed)
        .to_string()
}

/// One version of a remediation case.
///
/// `case_id`, `version_number`, `active` and `recorded_at` are owned by the
/// Store: values supplied by the caller are replaced on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: Option<i64>,
    pub hostname: Option<String>,
    pub device_path: Option<String>,
    pub resource_id: Option<i64>,
    pub cluster_id: Option<String>,
    pub state: CaseState,
    pub action: Action,
    pub wait_reason: WaitReason,
    pub resource_weight: Option<f64>,
    pub mount_point: Option<String>,
    pub host_serial: Option<String>,
    pub diagnostic: DiagnosticStatus,
    pub version_number: i64,
    pub active: bool,
    /// RFC 3339 UTC timestamp of the write that produced this version.
    pub recorded_at: Option<String>,
}

impl Default for Case {
    fn default() -> Self {
        Self::open()
    }
}

impl Case {
    /// A fresh, unsaved case in state `NEW` with no identity yet.
    pub fn open() -> Self {
        Case {
            case_id: None,
            hostname: None,
            device_path: None,
            resource_id: None,
            cluster_id: None,
            state: CaseState::New,
            action: Action::None,
            wait_reason: WaitReason::None,
            resource_weight: None,
            mount_point: None,
            host_serial: None,
            diagnostic: DiagnosticStatus::Unknown,
            version_number: 1,
            active: true,
            recorded_at: None,
        }
    }

    pub fn with_host_device(mut self, hostname: &str, device_path: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self.device_path = Some(normalize_device_path(device_path));
        self
    }

    pub fn with_resource(mut self, resource_id: i64, cluster_id: &str) -> Self {
        self.resource_id = Some(resource_id);
        self.cluster_id = Some(cluster_id.to_string());
        self
    }

    /// The `(hostname, device_path)` pair, if both halves are present.
    pub fn host_device_key(&self) -> Option<IdentityKey> {
        match (&self.hostname, &self.device_path) {
            (Some(hostname), Some(device_path)) => Some(IdentityKey::HostDevice {
                hostname: hostname.clone(),
                device_path: device_path.clone(),
            }),
            _ => None,
        }
    }

    /// The `(resource_id, cluster_id)` pair, if both halves are present.
    pub fn resource_cluster_key(&self) -> Option<IdentityKey> {
        match (self.resource_id, &self.cluster_id) {
            (Some(resource_id), Some(cluster_id)) => Some(IdentityKey::ResourceCluster {
                resource_id,
                cluster_id: cluster_id.clone(),
            }),
            _ => None,
        }
    }

    /// Addressing key into the inventory. The physical pair wins when both
    /// pairs are complete.
    pub fn identity_key(&self) -> Option<IdentityKey> {
        self.host_device_key().or_else(|| self.resource_cluster_key())
    }

    /// Field-level checks the Store enforces on every write.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(id) = self.resource_id {
            if id < 0 {
                return Err(format!("resource_id must be non-negative, got {id}"));
            }
        }
        if let Some(weight) = self.resource_weight {
            if weight.is_nan() || weight < 0.0 {
                return Err(format!("resource_weight must be >= 0, got {weight}"));
            }
        }
        if self.version_number < 1 {
            return Err(format!(
                "version_number must start at 1, got {}",
                self.version_number
            ));
        }
        Ok(())
    }

    /// True when `other` carries an identity field that differs from a value
    /// already set here. Unset fields may still be filled in.
    pub fn identity_conflicts_with(&self, other: &Case) -> bool {
        fn differs<T: PartialEq>(current: &Option<T>, next: &Option<T>) -> bool {
            current.is_some() && current != next
        }
        differs(&self.hostname, &other.hostname)
            || differs(&self.device_path, &other.device_path)
            || differs(&self.resource_id, &other.resource_id)
            || differs(&self.cluster_id, &other.cluster_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_text_round_trips_for_every_state() {
        for state in CaseState::ALL {
            assert_eq!(state.as_str().parse::<CaseState>().unwrap(), state);
        }
    }

    #[test]
    fn state_parse_is_case_insensitive_and_accepts_dashes() {
        assert_eq!(
            "wait-for-replacement".parse::<CaseState>().unwrap(),
            CaseState::WaitForReplacement
        );
        assert_eq!("new".parse::<CaseState>().unwrap(), CaseState::New);
    }

    #[test]
    fn unknown_state_is_rejected() {
        let err = "Issue detected".parse::<CaseState>().unwrap_err();
        assert_eq!(err.kind, "case state");
    }

    #[test]
    fn state_serializes_as_canonical_text() {
        let json = serde_json::to_string(&CaseState::OperatorNeeded).unwrap();
        assert_eq!(json, "\"OPERATOR_NEEDED\"");
    }

    #[test]
    fn timestamps_are_rfc3339_utc() {
        let ts = now_rfc3339().unwrap();
        assert!(ts.ends_with('Z'), "expected UTC timestamp, got {ts}");
        assert!(time::OffsetDateTime::parse(
            &ts,
            &time::format_description::well_known::Rfc3339
        )
        .is_ok());
    }

    #[test]
    fn device_path_prefix_is_stripped() {
        assert_eq!(normalize_device_path("/dev/sdb"), "sdb");
        assert_eq!(normalize_device_path(" sdc "), "sdc");
        let case = Case::open().with_host_device("node1", "/dev/nvme0n1");
        assert_eq!(case.device_path.as_deref(), Some("nvme0n1"));
    }

    #[test]
    fn identity_key_prefers_host_device() {
        let case = Case::open()
            .with_host_device("node1", "sdb")
            .with_resource(7, "ceph-a");
        assert!(matches!(
            case.identity_key(),
            Some(IdentityKey::HostDevice { .. })
        ));

        let by_resource = Case::open().with_resource(7, "ceph-a");
        assert_eq!(
            by_resource.identity_key(),
            Some(IdentityKey::ResourceCluster {
                resource_id: 7,
                cluster_id: "ceph-a".to_string()
            })
        );
    }

    #[test]
    fn half_a_pair_is_not_an_identity() {
        let mut case = Case::open();
        case.hostname = Some("node1".to_string());
        case.resource_id = Some(3);
        assert!(case.identity_key().is_none());
    }

    #[test]
    fn validate_rejects_negative_fields() {
        let mut case = Case::open().with_resource(-1, "c1");
        assert!(case.validate().is_err());
        case.resource_id = Some(1);
        case.resource_weight = Some(-0.5);
        assert!(case.validate().is_err());
        case.resource_weight = Some(0.0);
        assert!(case.validate().is_ok());
    }

    #[test]
    fn identity_conflict_allows_filling_unset_fields() {
        let current = Case::open().with_host_device("node1", "sdb");
        let filled = current.clone().with_resource(7, "c1");
        assert!(!current.identity_conflicts_with(&filled));

        let moved = Case::open().with_host_device("node2", "sdb");
        assert!(current.identity_conflicts_with(&moved));
    }
}
