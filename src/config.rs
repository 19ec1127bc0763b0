//! Configuration loading for Script Buttons
//!
//! One JSON file (~/.script-buttons/config.json) holds the user-facing
//! options. Loading never fails: a missing or malformed file yields
//! [`Config::default`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Default for the animated running indicator
pub const DEFAULT_SPIN_ICON: bool = true;

/// User-facing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Animate the running indicator. When false, running rows show a
    /// static stopped-square glyph instead of a spinner.
    #[serde(default = "default_spin_icon")]
    pub spin_icon: bool,
}

fn default_spin_icon() -> bool {
    DEFAULT_SPIN_ICON
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spin_icon: DEFAULT_SPIN_ICON,
        }
    }
}

/// Default config file location (~/.script-buttons/config.json)
pub fn default_config_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde("~/.script-buttons/config.json").as_ref())
}

/// Load configuration from the given path.
///
/// Returns `Config::default()` if the file is missing, unreadable, or not
/// valid JSON.
#[instrument(name = "load_config")]
pub fn load_config(path: &Path) -> Config {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Config::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to read config, using defaults");
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&content) {
        Ok(config) => {
            info!(path = %path.display(), spin_icon = config.spin_icon, "Loaded config");
            config
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to parse config JSON, using defaults");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("config.json"));
        assert_eq!(config, Config::default());
        assert!(config.spin_icon);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config(&path), Config::default());
    }

    #[test]
    fn spin_icon_is_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"spinIcon": false}"#).unwrap();
        assert!(!load_config(&path).spin_icon);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"spinIcon": false, "future": 1}"#).unwrap();
        assert!(!load_config(&path).spin_icon);
    }
}
