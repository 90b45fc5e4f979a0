// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `SessionStore` contract.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::debug;

use tether_config::model::StorageConfig;
use tether_core::{
    HealthStatus, Session, SessionPatch, SessionQuery, SessionStore, TetherError,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed session store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query module. The database is lazily initialized on the first call
/// to [`SessionStore::initialize`].
pub struct SqliteSessionStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteSessionStore {
    /// Create a new store with the given configuration.
    ///
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not
    /// initialized.
    fn db(&self) -> Result<&Database, TetherError> {
        self.db.get().ok_or_else(|| TetherError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn initialize(&self) -> Result<(), TetherError> {
        let db = Database::open_with_options(&self.config.database_path, self.config.wal_mode)
            .await?;
        self.db.set(db).map_err(|_| TetherError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite session store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), TetherError> {
        self.db()?.close().await
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn create(&self, session: &Session) -> Result<(), TetherError> {
        queries::sessions::create_session(self.db()?, session).await
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, TetherError> {
        queries::sessions::get_session(self.db()?, id).await
    }

    async fn update(
        &self,
        id: &str,
        patch: &SessionPatch,
    ) -> Result<Option<Session>, TetherError> {
        queries::sessions::update_session(self.db()?, id, patch, Utc::now()).await
    }

    async fn upsert(&self, session: &Session) -> Result<(), TetherError> {
        queries::sessions::upsert_session(self.db()?, session).await
    }

    async fn delete(&self, id: &str) -> Result<bool, TetherError> {
        queries::sessions::delete_session(self.db()?, id).await
    }

    async fn get_user_sessions(
        &self,
        user_id: &str,
        query: &SessionQuery,
    ) -> Result<Vec<Session>, TetherError> {
        queries::sessions::list_user_sessions(self.db()?, user_id, query, Utc::now()).await
    }

    async fn cleanup(&self) -> Result<u64, TetherError> {
        queries::sessions::cleanup_expired(self.db()?, Utc::now()).await
    }
}
