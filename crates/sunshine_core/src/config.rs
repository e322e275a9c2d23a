//! Runtime configuration for the weather data layer.
//!
//! # Invariants
//! - Missing fields fall back to defaults; unknown fields are rejected.
//! - `forecast_days` and `sync_interval_secs` are strictly positive.

use crate::network::source::{NUM_DAYS, SYNC_INTERVAL};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Settings shared by the store, the remote source and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SunshineConfig {
    /// Look-ahead window: days of forecast that must be cached.
    pub forecast_days: u32,
    /// Period of the recurring background fetch.
    pub sync_interval_secs: u64,
    /// Weather database file; in-memory when unset.
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for SunshineConfig {
    fn default() -> Self {
        Self {
            forecast_days: NUM_DAYS,
            sync_interval_secs: SYNC_INTERVAL.as_secs(),
            db_path: None,
            log_level: None,
            log_dir: None,
        }
    }
}

impl SunshineConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forecast_days == 0 {
            return Err(ConfigError::Invalid(
                "forecast_days must be greater than zero".to_string(),
            ));
        }
        if self.sync_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sync_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
