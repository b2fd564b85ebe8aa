use serde::{Deserialize, Serialize};

/// The machine the engine runs on. Injected by the caller; the engines
/// never discover it themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub hostname: String,
    pub host_serial: String,
    /// The cluster this host serves.
    pub cluster_id: String,
}

impl HostIdentity {
    pub fn new(
        hostname: impl Into<String>,
        host_serial: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            host_serial: host_serial.into(),
            cluster_id: cluster_id.into(),
        }
    }
}
