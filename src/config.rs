//! Installation configuration for fdsq.
//!
//! Configuration is stored in TOML format at `~/.config/fdsq/config.toml`
//! (or XDG equivalent). Every field has a default, so a missing file is fine.
//!
//! # Example Configuration
//!
//! ```toml
//! binary = "/usr/local/bin/fdsdump"
//! profiles_data = "/var/lib/nfsen-ng/profiles-data/live"
//! profile = "live"
//! max_processes = 2
//! timeout_secs = 120
//! max_probe_steps = 8640
//! timezone = "local"
//! ```
//!
//! `FDSQ_BINARY`, `FDSQ_PROFILES_DATA`, `FDSQ_MAX_PROCESSES` and
//! `FDSQ_TIMEOUT_SECS` override the file (a `.env` file is honoured too).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::timeslots::BucketClock;

/// Default location of the fdsdump binary.
pub const DEFAULT_BINARY: &str = "/usr/bin/fdsdump";

/// Default hard timeout for a single fdsdump run.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Settings shared by every query of one installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FdsConfig {
    /// Path to the fdsdump executable.
    pub binary: String,
    /// Root containing one directory tree per source.
    pub profiles_data: PathBuf,
    /// Default profile name for this installation.
    pub profile: String,
    /// Ceiling for concurrently running fdsdump processes of this user.
    pub max_processes: usize,
    /// Hard timeout for a single run. `None` waits forever.
    pub timeout_secs: Option<u64>,
    /// Cap on grid steps per resolver walk. `None` bounds the walk by the
    /// requested range only.
    pub max_probe_steps: Option<u64>,
    /// Clock used to render bucket paths.
    pub timezone: BucketClock,
}

impl Default for FdsConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            profiles_data: PathBuf::from("/var/lib/fdsq/profiles-data"),
            profile: "live".to_string(),
            max_processes: 1,
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            max_probe_steps: None,
            timezone: BucketClock::Utc,
        }
    }
}

impl FdsConfig {
    /// Load configuration from the default location, then apply environment
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path, then apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    ///
    /// Uses XDG conventions:
    /// - Primary: `$XDG_CONFIG_HOME/fdsq/config.toml`
    /// - Fallback: platform-specific config dir
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join("fdsq").join("config.toml"));
        }

        dirs::config_dir()
            .map(|p| p.join("fdsq").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = dotenvy::var("FDSQ_BINARY") {
            self.binary = val;
        }
        if let Ok(val) = dotenvy::var("FDSQ_PROFILES_DATA") {
            self.profiles_data = PathBuf::from(val);
        }
        if let Ok(val) = dotenvy::var("FDSQ_MAX_PROCESSES") {
            self.max_processes = val.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "FDSQ_MAX_PROCESSES",
                value: val.clone(),
            })?;
        }
        if let Ok(val) = dotenvy::var("FDSQ_TIMEOUT_SECS") {
            let secs: u64 = val.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "FDSQ_TIMEOUT_SECS",
                value: val.clone(),
            })?;
            // 0 disables the timeout
            self.timeout_secs = (secs > 0).then_some(secs);
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.binary.trim().is_empty() {
            return Err(ConfigError::Validation(
                "binary path cannot be empty".into(),
            ));
        }
        if self.max_processes == 0 {
            return Err(ConfigError::Validation(
                "max_processes must be at least 1".into(),
            ));
        }
        if self.max_probe_steps == Some(0) {
            return Err(ConfigError::Validation(
                "max_probe_steps must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    /// Hard timeout as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
