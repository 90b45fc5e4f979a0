// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The storage contract every session backend satisfies.

use async_trait::async_trait;

use crate::error::TetherError;
use crate::types::{HealthStatus, Session, SessionPatch, SessionQuery};

/// Contract for session storage backends (durable relational store,
/// in-process volatile store, distributed cache store).
///
/// Backends manage their own connection lifecycle and isolation; nothing
/// above this trait re-implements storage. All fields except `id` are
/// overwritable; `id` changes are unrepresentable through [`SessionPatch`].
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Human-readable backend name, used in degraded-read logs.
    fn name(&self) -> &str;

    /// Initializes the backend (migrations, connection pool, etc.).
    async fn initialize(&self) -> Result<(), TetherError>;

    /// Closes the backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), TetherError>;

    /// Performs a health check and returns the backend's current status.
    async fn health_check(&self) -> Result<HealthStatus, TetherError>;

    /// Persist a new session. Fails if the id already exists.
    async fn create(&self, session: &Session) -> Result<(), TetherError>;

    /// Fetch a session by id. `Ok(None)` when absent.
    async fn get(&self, id: &str) -> Result<Option<Session>, TetherError>;

    /// Apply a partial update and return the merged session, or `Ok(None)`
    /// when the session does not exist. Advances `last_activity`.
    async fn update(
        &self,
        id: &str,
        patch: &SessionPatch,
    ) -> Result<Option<Session>, TetherError>;

    /// Insert or fully replace a session. Used by replication mirroring and
    /// the coordinator's merged write path.
    async fn upsert(&self, session: &Session) -> Result<(), TetherError>;

    /// Delete a session by id. Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool, TetherError>;

    /// List a user's sessions with pagination and optional expiry filtering,
    /// most recently active first.
    async fn get_user_sessions(
        &self,
        user_id: &str,
        query: &SessionQuery,
    ) -> Result<Vec<Session>, TetherError>;

    /// Sweep sessions whose `expires_at` has passed. Returns the number removed.
    async fn cleanup(&self) -> Result<u64, TetherError>;
}
