// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tether session subsystem.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Tether configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Primary storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Persistence coordinator settings (cache, failover, replication).
    #[serde(default)]
    pub persist: PersistConfig,

    /// Cross-device synchronization settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Session facade settings (defaults, lifetimes, maintenance).
    #[serde(default)]
    pub session: SessionConfig,

    /// Periodic database backup settings.
    #[serde(default)]
    pub backup: BackupConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the service instance.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "tether".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tether").join("tether.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tether.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Persistence coordinator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PersistConfig {
    /// Seconds a cache entry stays fresh after its last access.
    #[serde(default = "default_cache_timeout_secs")]
    pub cache_timeout_secs: u64,

    /// Whether writes are mirrored to the secondary store.
    #[serde(default = "default_replication_enabled")]
    pub replication_enabled: bool,

    /// Interval between replication flushes.
    #[serde(default = "default_replication_interval_secs")]
    pub replication_interval_secs: u64,

    /// Deadline for any single storage backend call; an expired call is
    /// treated as a storage failure.
    #[serde(default = "default_storage_call_timeout_secs")]
    pub storage_call_timeout_secs: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            cache_timeout_secs: default_cache_timeout_secs(),
            replication_enabled: default_replication_enabled(),
            replication_interval_secs: default_replication_interval_secs(),
            storage_call_timeout_secs: default_storage_call_timeout_secs(),
        }
    }
}

fn default_cache_timeout_secs() -> u64 {
    300
}

fn default_replication_enabled() -> bool {
    true
}

fn default_replication_interval_secs() -> u64 {
    30
}

fn default_storage_call_timeout_secs() -> u64 {
    30
}

/// Cross-device synchronization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Whether cross-device sync is enabled at all.
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,

    /// Deliver events immediately on queue instead of waiting for the
    /// periodic drain.
    #[serde(default)]
    pub realtime: bool,

    /// Interval between sync-queue drains and stale-data sweeps.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Cap on retained events per session; oldest entries are evicted past it.
    #[serde(default = "default_max_history_per_session")]
    pub max_history_per_session: usize,

    /// Retention window for event history and unresolved conflicts.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_sync_enabled(),
            realtime: false,
            sync_interval_secs: default_sync_interval_secs(),
            max_history_per_session: default_max_history_per_session(),
            retention_hours: default_retention_hours(),
        }
    }
}

fn default_sync_enabled() -> bool {
    true
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_max_history_per_session() -> usize {
    1000
}

fn default_retention_hours() -> u64 {
    24
}

/// Session facade configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Lifetime of newly created sessions.
    #[serde(default = "default_ttl_hours")]
    pub default_ttl_hours: u64,

    /// Interval between expiry sweeps run by the maintenance task.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Preferences merged into every newly created session.
    #[serde(default = "default_preferences")]
    pub default_preferences: serde_json::Value,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: default_ttl_hours(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            default_preferences: default_preferences(),
        }
    }
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_cleanup_interval_secs() -> u64 {
    600
}

fn default_preferences() -> serde_json::Value {
    serde_json::json!({
        "theme": "dark",
        "language": "en",
        "notifications": true,
    })
}

/// Periodic database backup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Whether the periodic backup timer runs.
    #[serde(default)]
    pub enabled: bool,

    /// Hours between backups.
    #[serde(default = "default_backup_interval_hours")]
    pub interval_hours: u64,

    /// Destination path for the backup file.
    #[serde(default = "default_backup_path")]
    pub backup_path: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_backup_interval_hours(),
            backup_path: default_backup_path(),
        }
    }
}

fn default_backup_interval_hours() -> u64 {
    24
}

fn default_backup_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tether").join("tether-backup.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tether-backup.db"))
        .to_string_lossy()
        .into_owned()
}
