//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/errbeacon/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/errbeacon/` (~/.config/errbeacon/)
//! - Data: `$XDG_DATA_HOME/errbeacon/` (~/.local/share/errbeacon/)
//! - State/Logs: `$XDG_STATE_HOME/errbeacon/` (~/.local/state/errbeacon/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Capture and flush settings
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Session store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Collector configuration
///
/// Fixed for the lifetime of a [`Collector`](crate::Collector). Transports and
/// handlers are not configurable from a file; they are registered on the
/// [`CollectorBuilder`](crate::CollectorBuilder).
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Remote collector URL. When unset, errors are buffered but never sent.
    pub endpoint: Option<String>,

    /// Extra fields merged into every flush payload
    #[serde(default)]
    pub extra_params: serde_json::Map<String, serde_json::Value>,

    /// Drop delivered records after a successful flush
    #[serde(default = "default_clear_on_save")]
    pub clear_on_save: bool,

    /// HTTP request timeout in seconds (built-in HTTP transport only)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Session the store is scoped to. Required when storage is enabled;
    /// otherwise a fresh id is generated per collector.
    pub session_id: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            extra_params: serde_json::Map::new(),
            clear_on_save: default_clear_on_save(),
            timeout_secs: default_timeout(),
            session_id: None,
        }
    }
}

impl CollectorConfig {
    /// Check if network flushing is enabled
    pub fn is_ready(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "collector.endpoint must be an http(s) URL, got {:?}",
                    endpoint
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "collector.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if let Some(session_id) = &self.session_id {
            if session_id.trim().is_empty() {
                return Err(Error::Config(
                    "collector.session_id must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn default_clear_on_save() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

/// Session store configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    /// Mirror the buffer into a SQLite session store
    #[serde(default)]
    pub enabled: bool,

    /// Override path for the store database
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved store path, falling back to [`Config::store_path`]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(Config::store_path)
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all sections.
    ///
    /// A persisted buffer is only read back under the session it was written
    /// with, so enabling storage requires a fixed `collector.session_id`.
    pub fn validate(&self) -> Result<()> {
        self.collector.validate()?;
        if self.storage.enabled && self.collector.session_id.is_none() {
            return Err(Error::Config(
                "storage.enabled requires collector.session_id".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/errbeacon/config.toml` (~/.config/errbeacon/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("errbeacon").join("config.toml")
    }

    /// Returns the data directory path (for the session store)
    ///
    /// `$XDG_DATA_HOME/errbeacon/` (~/.local/share/errbeacon/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("errbeacon")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/errbeacon/` (~/.local/state/errbeacon/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("errbeacon")
    }

    /// Returns the session store database path
    ///
    /// `$XDG_DATA_HOME/errbeacon/sessions.db`
    pub fn store_path() -> PathBuf {
        Self::data_dir().join("sessions.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.collector.endpoint.is_none());
        assert!(config.collector.clear_on_save);
        assert_eq!(config.collector.timeout_secs, 30);
        assert!(!config.storage.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(!config.collector.is_ready());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[collector]
endpoint = "https://errors.example.com/report"
clear_on_save = false
session_id = "tab-1"

[collector.extra_params]
app = "checkout"
build = 42

[storage]
enabled = true
path = "/tmp/errbeacon-test.db"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.collector.endpoint.as_deref(),
            Some("https://errors.example.com/report")
        );
        assert!(!config.collector.clear_on_save);
        assert_eq!(config.collector.session_id.as_deref(), Some("tab-1"));
        assert_eq!(config.collector.extra_params["app"], "checkout");
        assert_eq!(config.collector.extra_params["build"], 42);
        assert!(config.storage.enabled);
        assert_eq!(
            config.storage.resolved_path(),
            PathBuf::from("/tmp/errbeacon-test.db")
        );
        assert_eq!(config.logging.level, "debug");
        assert!(config.collector.is_ready());
    }

    #[test]
    fn test_collector_config_validation() {
        // Buffer-only config is valid
        let config = CollectorConfig::default();
        assert!(config.validate().is_ok());

        let config = CollectorConfig {
            endpoint: Some("ftp://errors.example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CollectorConfig {
            endpoint: Some("https://errors.example.com".to_string()),
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CollectorConfig {
            session_id: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[collector]\nendpoint = \"http://localhost:9000/errors\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(
            config.collector.endpoint.as_deref(),
            Some("http://localhost:9000/errors")
        );
    }

    #[test]
    fn test_load_from_rejects_invalid_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[collector]\nendpoint = \"localhost\"\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_storage_requires_session_id() {
        let mut config = Config::default();
        config.storage.enabled = true;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.collector.session_id = Some("tab-1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_rejects_storage_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\nenabled = true\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_paths() {
        assert!(Config::config_path().ends_with("errbeacon/config.toml"));
        assert!(Config::store_path().ends_with("errbeacon/sessions.db"));
        assert!(Config::state_dir().ends_with("errbeacon"));
    }
}
