//! Workspace configuration.
//!
//! A workspace is a directory holding the `programs/`, `states/`,
//! `breakpoints/` and `logs/` namespaces, plus an optional `lmc.yml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SETTINGS_FILENAME: &str = "lmc.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Tunables read from `lmc.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Merge persisted breakpoints into every run unless the caller opts out.
    #[serde(default = "default_true")]
    pub auto_load_breakpoints: bool,

    /// Capacity of the live-state channel handed to renderers.
    #[serde(default = "default_live_buffer")]
    pub live_buffer: usize,

    /// Cycles per second used when a run does not pick a schedule.
    #[serde(default)]
    pub default_speed: Option<f64>,

    /// Identity recorded in exported bundles.
    #[serde(default = "default_exporter")]
    pub exporter: String,

    /// Unlimited runs yield to the runtime after this many cycles.
    #[serde(default = "default_yield_every")]
    pub yield_every: u64,
}

fn default_true() -> bool {
    true
}

fn default_live_buffer() -> usize {
    16
}

fn default_exporter() -> String {
    concat!("lmc/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_yield_every() -> u64 {
    256
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_load_breakpoints: default_true(),
            live_buffer: default_live_buffer(),
            default_speed: None,
            exporter: default_exporter(),
            yield_every: default_yield_every(),
        }
    }
}

/// Root directory plus settings. Passed by value into every store.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    root: PathBuf,
    pub settings: Settings,
}

impl WorkspaceConfig {
    /// Workspace at `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            settings: Settings::default(),
        }
    }

    /// Workspace at `root`, reading `lmc.yml` from it when present.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let root = root.into();
        let settings_path = root.join(SETTINGS_FILENAME);
        let settings = if settings_path.is_file() {
            let contents = std::fs::read_to_string(&settings_path)?;
            if contents.trim().is_empty() {
                Settings::default()
            } else {
                serde_yaml::from_str(&contents)?
            }
        } else {
            Settings::default()
        };
        Ok(Self { root, settings })
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn programs_dir(&self) -> PathBuf {
        self.root.join("programs")
    }

    pub fn states_dir(&self) -> PathBuf {
        self.root.join("states")
    }

    pub fn breakpoints_dir(&self) -> PathBuf {
        self.root.join("breakpoints")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = WorkspaceConfig::new("/tmp/ws");
        assert!(config.settings.auto_load_breakpoints);
        assert_eq!(config.settings.live_buffer, 16);
        assert_eq!(config.settings.default_speed, None);
        assert_eq!(config.programs_dir(), PathBuf::from("/tmp/ws/programs"));
        assert_eq!(config.breakpoints_dir(), PathBuf::from("/tmp/ws/breakpoints"));
    }

    #[test]
    fn test_load_without_settings_file() {
        let dir = tempdir().unwrap();
        let config = WorkspaceConfig::load(dir.path()).unwrap();
        assert_eq!(config.settings, Settings::default());
    }

    #[test]
    fn test_load_partial_settings() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILENAME),
            "auto_load_breakpoints: false\ndefault_speed: 4.0\n",
        )
        .unwrap();

        let config = WorkspaceConfig::load(dir.path()).unwrap();
        assert!(!config.settings.auto_load_breakpoints);
        assert_eq!(config.settings.default_speed, Some(4.0));
        assert_eq!(config.settings.live_buffer, 16);
    }

    #[test]
    fn test_load_rejects_bad_yaml() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILENAME), "live_buffer: [").unwrap();
        assert!(matches!(
            WorkspaceConfig::load(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
