//! Engine configuration, read from TOML.
//!
//! ```toml
//! drain_weight = 0.0
//!
//! [removal]
//! replace = true
//! zap = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::collaborators::RemovalOptions;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid engine config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Weight the resource is drained to while preparing for removal.
    pub drain_weight: f64,
    pub removal: RemovalOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drain_weight: 0.0,
            removal: RemovalOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drain_weight.is_nan() || self.drain_weight < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "drain_weight must be >= 0, got {}",
                self.drain_weight
            )));
        }
        Ok(())
    }
}
