// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the full session stack -- temp SQLite primary,
//! in-memory secondary, persistence coordinator, sync service, and the
//! session facade -- with every subsystem handle exposed for assertions.

use std::sync::Arc;

use tether_bus::EventBus;
use tether_config::model::{PersistConfig, SessionConfig, StorageConfig, SyncConfig};
use tether_core::{SessionStore, TetherError};
use tether_persist::PersistenceCoordinator;
use tether_session::SessionManager;
use tether_storage::{MemorySessionStore, SqliteSessionStore};
use tether_sync::SyncService;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    realtime: bool,
    with_secondary: bool,
    cache_timeout_secs: u64,
    session: SessionConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            realtime: true,
            with_secondary: true,
            cache_timeout_secs: 300,
            session: SessionConfig::default(),
        }
    }

    /// Disable immediate delivery; events wait for explicit queue drains.
    pub fn with_periodic_sync(mut self) -> Self {
        self.realtime = false;
        self
    }

    /// Build without a secondary store (no replication, no fallback).
    pub fn without_secondary(mut self) -> Self {
        self.with_secondary = false;
        self
    }

    pub fn with_cache_timeout_secs(mut self, secs: u64) -> Self {
        self.cache_timeout_secs = secs;
        self
    }

    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Build the harness, creating all required subsystems on a temp database.
    pub async fn build(self) -> Result<TestHarness, TetherError> {
        let temp_dir = tempfile::TempDir::new().map_err(TetherError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        let db_path_str = db_path.to_string_lossy().to_string();

        let primary = SqliteSessionStore::new(StorageConfig {
            database_path: db_path_str.clone(),
            wal_mode: true,
        });
        primary.initialize().await?;
        let primary: Arc<dyn SessionStore> = Arc::new(primary);

        let secondary_store = Arc::new(MemorySessionStore::new());
        let secondary: Option<Arc<dyn SessionStore>> = if self.with_secondary {
            Some(secondary_store.clone())
        } else {
            None
        };

        let persist_config = PersistConfig {
            cache_timeout_secs: self.cache_timeout_secs,
            replication_enabled: self.with_secondary,
            replication_interval_secs: 1,
            storage_call_timeout_secs: 10,
        };
        let coordinator = Arc::new(PersistenceCoordinator::new(
            primary.clone(),
            secondary,
            persist_config,
        ));

        let bus = EventBus::default();
        let sync = Arc::new(SyncService::new(
            SyncConfig {
                realtime: self.realtime,
                ..Default::default()
            },
            bus.clone(),
        ));

        let manager = Arc::new(SessionManager::new(
            coordinator.clone(),
            Some(sync.clone()),
            bus.clone(),
            self.session,
        ));

        Ok(TestHarness {
            manager,
            coordinator,
            sync,
            bus,
            primary,
            secondary: secondary_store,
            db_path: db_path_str,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment on a temp SQLite database.
pub struct TestHarness {
    /// The session facade under test.
    pub manager: Arc<SessionManager>,
    /// Persistence coordinator, for direct read/write assertions.
    pub coordinator: Arc<PersistenceCoordinator>,
    /// Synchronization service, for device-level assertions.
    pub sync: Arc<SyncService>,
    /// Notification bus; subscribe before acting to assert on envelopes.
    pub bus: EventBus,
    /// The SQLite primary store.
    pub primary: Arc<dyn SessionStore>,
    /// The in-memory secondary store (unused when built without one).
    pub secondary: Arc<MemorySessionStore>,
    /// Path of the temp database file.
    pub db_path: String,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_session::CreateSessionRequest;

    #[tokio::test]
    async fn builder_creates_working_environment() {
        let harness = TestHarness::builder().build().await.unwrap();
        let session = harness
            .manager
            .create_session(CreateSessionRequest::default())
            .await
            .unwrap();
        assert!(harness
            .manager
            .get_session(&session.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn harnesses_are_isolated() {
        let h1 = TestHarness::builder().build().await.unwrap();
        let h2 = TestHarness::builder().build().await.unwrap();

        let s1 = h1
            .manager
            .create_session(CreateSessionRequest::default())
            .await
            .unwrap();

        assert!(h2.manager.get_session(&s1.id).await.unwrap().is_none());
        assert_ne!(h1.db_path, h2.db_path);
    }
}
