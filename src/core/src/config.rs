//! Configuration management.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{ConveyorError, Result};
use crate::telemetry::LoggingConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Job store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Worker configuration
    #[serde(default)]
    pub worker: WorkerSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the sqlite database file. Defaults to
    /// `~/.conveyor/data/conveyor.db` when unset.
    pub path: Option<PathBuf>,

    /// Maximum number of pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked database (seconds)
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl StoreConfig {
    /// Resolve the database path, falling back to the default data
    /// directory.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// Poll interval between unsuccessful claims (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// Default value functions
fn default_max_connections() -> u32 { 5 }
fn default_busy_timeout_secs() -> u64 { 30 }
fn default_poll_interval_ms() -> u64 { 1000 }

/// Return the data directory (`~/.conveyor/data`).
pub fn default_data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ConveyorError::configuration("Could not determine home directory"))?;
    Ok(home.join(".conveyor").join("data"))
}

/// Return the default database path (`~/.conveyor/data/conveyor.db`).
pub fn default_db_path() -> Result<PathBuf> {
    Ok(default_data_dir()?.join("conveyor.db"))
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CONVEYOR").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CONVEYOR").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.max_connections, 5);
        assert_eq!(config.store.busy_timeout_secs, 30);
        assert_eq!(config.worker.poll_interval_ms, 1000);
        assert!(config.store.path.is_none());
    }

    #[test]
    fn test_resolved_path_explicit() {
        let store = StoreConfig {
            path: Some(PathBuf::from("/tmp/jobs.db")),
            ..Default::default()
        };
        assert_eq!(store.resolved_path().unwrap(), PathBuf::from("/tmp/jobs.db"));
    }
}
