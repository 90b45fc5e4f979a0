// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and non-zero intervals.

use crate::diagnostic::ConfigError;
use crate::model::TetherConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TetherConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.persist.cache_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "persist.cache_timeout_secs must be greater than zero".to_string(),
        });
    }

    if config.persist.storage_call_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "persist.storage_call_timeout_secs must be greater than zero".to_string(),
        });
    }

    if config.persist.replication_enabled && config.persist.replication_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "persist.replication_interval_secs must be greater than zero when replication is enabled"
                .to_string(),
        });
    }

    if config.sync.enabled {
        if config.sync.sync_interval_secs == 0 {
            errors.push(ConfigError::Validation {
                message: "sync.sync_interval_secs must be greater than zero".to_string(),
            });
        }
        if config.sync.max_history_per_session == 0 {
            errors.push(ConfigError::Validation {
                message: "sync.max_history_per_session must be greater than zero".to_string(),
            });
        }
    }

    if !config.session.default_preferences.is_object() {
        errors.push(ConfigError::Validation {
            message: "session.default_preferences must be a table".to_string(),
        });
    }

    if config.session.default_ttl_hours == 0 {
        errors.push(ConfigError::Validation {
            message: "session.default_ttl_hours must be greater than zero".to_string(),
        });
    }

    if config.backup.enabled {
        if config.backup.backup_path.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "backup.backup_path must not be empty when backup is enabled".to_string(),
            });
        }
        if config.backup.interval_hours == 0 {
            errors.push(ConfigError::Validation {
                message: "backup.interval_hours must be greater than zero".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
