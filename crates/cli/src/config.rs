//! CLI configuration file.
//!
//! Looked up at `--config <path>` or `~/.dlc/config.toml`. Every key is
//! optional; a missing default file is the same as an empty one.
//!
//! ```toml
//! [database]
//! path = "/var/lib/dlc/dlc.sqlite"
//!
//! [logging]
//! filter = "dlc_core=info,warn"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_DIR: &str = ".dlc";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "dlc.sqlite";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
}

/// `[database]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSettings {
    pub path: Option<PathBuf>,
}

/// `[logging]` section. `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

fn dlc_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR))
}

/// Read the config file. An explicit path must exist; the default path is
/// optional.
pub fn load(explicit: Option<&Path>) -> Result<CliConfig, String> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match dlc_home().map(|dir| dir.join(CONFIG_FILE)) {
            Some(path) if path.exists() => path,
            _ => return Ok(CliConfig::default()),
        },
    };
    let text = std::fs::read_to_string(&path)
        .map_err(|e| format!("error reading config '{}': {}", path.display(), e))?;
    toml::from_str(&text).map_err(|e| format!("error parsing config '{}': {}", path.display(), e))
}

impl CliConfig {
    /// Database location: `--db` flag, then the config file, then
    /// `~/.dlc/dlc.sqlite`.
    pub fn database_path(&self, flag: Option<&Path>) -> Result<PathBuf, String> {
        if let Some(path) = flag.or(self.database.path.as_deref()) {
            return Ok(path.to_path_buf());
        }
        dlc_home()
            .map(|dir| dir.join(DATABASE_FILE))
            .ok_or_else(|| "no home directory; pass --db".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn flag_beats_config_file() {
        let config: CliConfig = toml::from_str("[database]\npath = \"/srv/dlc.sqlite\"\n").unwrap();
        assert_eq!(
            config.database_path(None).unwrap(),
            PathBuf::from("/srv/dlc.sqlite")
        );
        assert_eq!(
            config
                .database_path(Some(Path::new("/tmp/other.sqlite")))
                .unwrap(),
            PathBuf::from("/tmp/other.sqlite")
        );
    }

    #[test]
    fn unknown_section_is_rejected() {
        assert!(toml::from_str::<CliConfig>("[databse]\npath = \"x\"\n").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.contains("error reading config"));
    }
}
