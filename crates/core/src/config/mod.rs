//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (RETRACE_*)
//! 2. TOML config file (if RETRACE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// History subsystem configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (RETRACE_*)
/// 2. TOML config file (if RETRACE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the encrypted SQLite history database.
    ///
    /// Set via RETRACE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Rows decrypted and applied per write-lock hold during population.
    ///
    /// Set via RETRACE_POPULATE_BATCH environment variable.
    #[serde(default = "default_populate_batch")]
    pub populate_batch: usize,

    /// Records removed per write-lock hold during a purge pass.
    ///
    /// Set via RETRACE_PURGE_BATCH environment variable.
    #[serde(default = "default_purge_batch")]
    pub purge_batch: usize,

    /// Seconds between age-based expiry passes.
    ///
    /// Set via RETRACE_PURGE_INTERVAL_SECS environment variable.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Age in days beyond which non-favorite records expire.
    ///
    /// Unset disables the expiry timer entirely.
    /// Set via RETRACE_RETENTION_DAYS environment variable.
    #[serde(default)]
    pub retention_days: Option<i64>,

    /// Capacity of the event fan-out channel.
    ///
    /// Set via RETRACE_EVENT_CAPACITY environment variable.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./retrace-history.sqlite")
}

fn default_populate_batch() -> usize {
    256
}

fn default_purge_batch() -> usize {
    128
}

fn default_purge_interval_secs() -> u64 {
    3_600
}

fn default_event_capacity() -> usize {
    256
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            populate_batch: default_populate_batch(),
            purge_batch: default_purge_batch(),
            purge_interval_secs: default_purge_interval_secs(),
            retention_days: None,
            event_capacity: default_event_capacity(),
        }
    }
}

impl AppConfig {
    /// Expiry timer period as a Duration for use with tokio.
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `RETRACE_`
    /// 2. TOML file from `RETRACE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("RETRACE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("RETRACE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
