//! Configuration for faultline.
//!
//! Loaded from a TOML file; every section is optional and falls back to
//! defaults.
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/server/faultline"
//! archive_dir = "archived"
//!
//! [capture]
//! placeholder = "%actor%"
//! self_component = "faultline"
//! registry_refresh_delay_ms = 100
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;

/// Environment variable overriding `storage.data_dir`.
pub const DATA_DIR_ENV: &str = "FAULTLINE_DATA_DIR";

/// Permission an operator needs to run the `faultline` command.
pub const COMMAND_PERMISSION: &str = "faultline.command";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly colored output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::ValidationError(format!(
                "unknown log format '{other}' (expected pretty or json)"
            ))),
        }
    }
}

/// Where record units live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON unit per active record.
    pub data_dir: PathBuf,
    /// Subdirectory of `data_dir` that receives archived units.
    pub archive_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            archive_dir: "archived".to_string(),
        }
    }
}

impl StorageConfig {
    /// Absolute path of the archive area.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(&self.archive_dir)
    }
}

/// Capture pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Token substituted for the reporter identity in messages and traces.
    pub placeholder: String,
    /// Component name of the capture system itself; never attributed.
    pub self_component: String,
    /// Delay before the one-shot component registry rebuild.
    pub registry_refresh_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            placeholder: "%actor%".to_string(),
            self_component: "faultline".to_string(),
            registry_refresh_delay_ms: 100,
        }
    }
}

impl CaptureConfig {
    #[must_use]
    pub fn registry_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.registry_refresh_delay_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub logging: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        let mut config = Self::from_toml(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    ///
    /// An explicitly passed path that does not exist is an error; the
    /// default location is optional.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Parse configuration from TOML text without touching the environment.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            if !dir.is_empty() {
                self.storage.data_dir = PathBuf::from(dir);
            }
        }
    }

    /// Reject values the capture pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.placeholder.is_empty() {
            return Err(ConfigError::ValidationError(
                "capture.placeholder must not be empty".to_string(),
            ));
        }
        if self.capture.self_component.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "capture.self_component must not be empty".to_string(),
            ));
        }
        if self.storage.archive_dir.is_empty()
            || self.storage.archive_dir.contains(['/', '\\'])
        {
            return Err(ConfigError::ValidationError(format!(
                "storage.archive_dir must be a plain directory name, got '{}'",
                self.storage.archive_dir
            )));
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from(".faultline"), |dir| dir.join("faultline"))
}
