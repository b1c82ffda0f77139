//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `populate_batch` or `purge_batch` is 0 or exceeds 10000
    /// - `purge_interval_secs` is 0
    /// - `retention_days` is set but not positive
    /// - `event_capacity` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.populate_batch == 0 || self.populate_batch > 10_000 {
            return Err(ConfigError::Invalid {
                field: "populate_batch".into(),
                reason: "must be between 1 and 10000".into(),
            });
        }

        if self.purge_batch == 0 || self.purge_batch > 10_000 {
            return Err(ConfigError::Invalid {
                field: "purge_batch".into(),
                reason: "must be between 1 and 10000".into(),
            });
        }

        if self.purge_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "purge_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if let Some(days) = self.retention_days {
            if days <= 0 {
                return Err(ConfigError::Invalid {
                    field: "retention_days".into(),
                    reason: "must be positive when set".into(),
                });
            }
        }

        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "event_capacity".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_populate_batch_zero() {
        let config = AppConfig { populate_batch: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "populate_batch"));
    }

    #[test]
    fn test_validate_purge_batch_exceeds_limit() {
        let config = AppConfig { purge_batch: 10_001, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "purge_batch"));
    }

    #[test]
    fn test_validate_purge_interval_zero() {
        let config = AppConfig { purge_interval_secs: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "purge_interval_secs"));
    }

    #[test]
    fn test_validate_negative_retention() {
        let config = AppConfig { retention_days: Some(-7), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "retention_days"));
    }

    #[test]
    fn test_validate_event_capacity_zero() {
        let config = AppConfig { event_capacity: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "event_capacity"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig {
            populate_batch: 1,
            purge_batch: 10_000,
            purge_interval_secs: 1,
            retention_days: Some(1),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
