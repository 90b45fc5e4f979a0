// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persistence coordinator: fast reads, durable writes.
//!
//! Reads go cache -> primary -> secondary; writes always land on the primary
//! and are mirrored to the secondary asynchronously. Every storage call is
//! bounded by a deadline, after which it is treated as a storage failure and
//! falls through to the fallback path (or surfaces, if none exists). Writes
//! are never silently dropped: they succeed against the primary or fail
//! loudly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tether_config::model::PersistConfig;
use tether_core::merge;
use tether_core::{BackupHook, Session, SessionPatch, SessionQuery, SessionStore, TetherError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::SessionCache;
use crate::export::{serialize_sessions, ExportFormat};
use crate::replication::{spawn_replication_worker, ReplicationQueue};

/// Owns the primary and optional secondary store, the TTL read cache, and
/// the replication queue. Constructed once per process and passed by
/// reference to callers.
pub struct PersistenceCoordinator {
    primary: Arc<dyn SessionStore>,
    secondary: Option<Arc<dyn SessionStore>>,
    cache: SessionCache,
    replication: Arc<ReplicationQueue>,
    config: PersistConfig,
}

impl PersistenceCoordinator {
    pub fn new(
        primary: Arc<dyn SessionStore>,
        secondary: Option<Arc<dyn SessionStore>>,
        config: PersistConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            cache: SessionCache::new(Duration::from_secs(config.cache_timeout_secs)),
            replication: Arc::new(ReplicationQueue::new()),
            config,
        }
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.storage_call_timeout_secs)
    }

    /// Bound a storage call by the configured deadline. An expired deadline
    /// is a storage failure for fallback purposes.
    async fn timed<T>(
        &self,
        fut: impl Future<Output = Result<T, TetherError>>,
    ) -> Result<T, TetherError> {
        let duration = self.call_timeout();
        match tokio::time::timeout(duration, fut).await {
            Ok(result) => result,
            Err(_) => Err(TetherError::Timeout { duration }),
        }
    }

    fn validate(session: &Session) -> Result<(), TetherError> {
        if session.id.trim().is_empty() {
            return Err(TetherError::Validation("session id must not be empty".into()));
        }
        if session.last_activity < session.created_at {
            return Err(TetherError::Validation(format!(
                "session {} has last_activity before created_at",
                session.id
            )));
        }
        Ok(())
    }

    fn replication_active(&self) -> bool {
        self.config.replication_enabled && self.secondary.is_some()
    }

    async fn enqueue_replication(&self, id: &str) {
        if self.replication_active() {
            self.replication.enqueue(id).await;
        }
    }

    /// Write a new session to the primary store. Populates the cache and
    /// queues the secondary mirror; fails only if the primary write fails.
    pub async fn create(&self, session: &Session) -> Result<Session, TetherError> {
        Self::validate(session)?;
        self.timed(self.primary.create(session)).await?;
        self.cache.put(session.clone()).await;
        self.enqueue_replication(&session.id).await;
        debug!(session_id = session.id.as_str(), "session created");
        Ok(session.clone())
    }

    /// Read a session: cache first, then primary, then secondary. A primary
    /// failure is masked with a degraded-read warning when the secondary can
    /// answer; a miss in all consulted stores is `NotFound`.
    pub async fn get(&self, id: &str) -> Result<Session, TetherError> {
        if let Some(session) = self.cache.get(id).await {
            return Ok(session);
        }

        let session = self.read_through(id).await?;
        self.cache.put(session.clone()).await;
        Ok(session)
    }

    async fn read_through(&self, id: &str) -> Result<Session, TetherError> {
        match self.timed(self.primary.get(id)).await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => match &self.secondary {
                // The update contract is "not found in either store", so a
                // primary miss still consults the replica before giving up.
                Some(secondary) => match self.timed(secondary.get(id)).await {
                    Ok(Some(session)) => {
                        debug!(
                            session_id = id,
                            store = secondary.name(),
                            "session recovered from secondary after primary miss"
                        );
                        Ok(session)
                    }
                    Ok(None) => Err(TetherError::NotFound { id: id.to_string() }),
                    Err(e) => {
                        warn!(session_id = id, error = %e, "secondary read failed after primary miss");
                        Err(TetherError::NotFound { id: id.to_string() })
                    }
                },
                None => Err(TetherError::NotFound { id: id.to_string() }),
            },
            Err(primary_err) if primary_err.is_fallback_eligible() => {
                let Some(secondary) = &self.secondary else {
                    return Err(primary_err);
                };
                warn!(
                    session_id = id,
                    store = secondary.name(),
                    error = %primary_err,
                    "primary read failed, serving degraded read from secondary"
                );
                match self.timed(secondary.get(id)).await {
                    Ok(Some(session)) => Ok(session),
                    Ok(None) => Err(TetherError::NotFound { id: id.to_string() }),
                    Err(secondary_err) => {
                        error!(
                            session_id = id,
                            error = %secondary_err,
                            "secondary read also failed"
                        );
                        Err(primary_err)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Merge a partial update into the current session and write the result
    /// to the primary. The read side uses the same fallback path as [`get`].
    pub async fn update(&self, id: &str, patch: &SessionPatch) -> Result<Session, TetherError> {
        let mut session = self.get(id).await?;
        merge::apply_patch(&mut session, patch, Utc::now());

        self.timed(self.primary.upsert(&session)).await?;
        self.cache.put(session.clone()).await;
        self.enqueue_replication(id).await;
        debug!(session_id = id, "session updated");
        Ok(session)
    }

    /// Write a fully reconciled session (sync path). Same durability rules
    /// as [`update`] without the read-merge step.
    pub async fn write_through(&self, session: &Session) -> Result<(), TetherError> {
        Self::validate(session)?;
        self.timed(self.primary.upsert(session)).await?;
        self.cache.put(session.clone()).await;
        self.enqueue_replication(&session.id).await;
        Ok(())
    }

    /// Delete from the primary, best-effort delete from the secondary, evict
    /// the cache entry, and cancel any pending replication for the id.
    pub async fn delete(&self, id: &str) -> Result<bool, TetherError> {
        let removed = self.timed(self.primary.delete(id)).await?;

        if let Some(secondary) = &self.secondary
            && let Err(e) = self.timed(secondary.delete(id)).await
        {
            warn!(session_id = id, error = %e, "secondary delete failed (best-effort)");
        }

        self.cache.evict(id).await;
        self.replication.cancel(id).await;
        debug!(session_id = id, removed, "session deleted");
        Ok(removed)
    }

    /// Sweep expired sessions from both stores and stale entries from the
    /// cache. Returns the primary's sweep count; the secondary sweep is
    /// best-effort and only logged (summing both would double-count
    /// replicated sessions).
    pub async fn cleanup_expired(&self) -> Result<u64, TetherError> {
        let removed = self.timed(self.primary.cleanup()).await?;

        if let Some(secondary) = &self.secondary {
            match self.timed(secondary.cleanup()).await {
                Ok(n) => debug!(count = n, store = secondary.name(), "secondary sweep complete"),
                Err(e) => warn!(error = %e, "secondary sweep failed (best-effort)"),
            }
        }

        let evicted = self.cache.evict_stale().await;
        if removed > 0 || evicted > 0 {
            info!(removed, cache_evicted = evicted, "expiry sweep complete");
        }
        Ok(removed)
    }

    /// List a user's sessions from the primary, falling back to the
    /// secondary on primary failure.
    pub async fn get_user_sessions(
        &self,
        user_id: &str,
        query: &SessionQuery,
    ) -> Result<Vec<Session>, TetherError> {
        match self.timed(self.primary.get_user_sessions(user_id, query)).await {
            Ok(sessions) => Ok(sessions),
            Err(primary_err) if primary_err.is_fallback_eligible() => {
                let Some(secondary) = &self.secondary else {
                    return Err(primary_err);
                };
                warn!(
                    user_id,
                    error = %primary_err,
                    "primary listing failed, serving degraded listing from secondary"
                );
                self.timed(secondary.get_user_sessions(user_id, query)).await
            }
            Err(e) => Err(e),
        }
    }

    /// Serialize a bounded page of a user's sessions.
    pub async fn export_all(
        &self,
        user_id: &str,
        query: &SessionQuery,
        format: ExportFormat,
    ) -> Result<String, TetherError> {
        let sessions = self.get_user_sessions(user_id, query).await?;
        serialize_sessions(&sessions, format)
    }

    /// Current replication backlog size.
    pub async fn replication_backlog(&self) -> usize {
        self.replication.len().await
    }

    /// Spawn the background replication worker. Returns `None` when
    /// replication is disabled or no secondary is configured.
    pub fn spawn_replication(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let secondary = self.secondary.clone()?;
        if !self.config.replication_enabled {
            return None;
        }
        info!(
            interval_secs = self.config.replication_interval_secs,
            store = secondary.name(),
            "replication worker starting"
        );
        Some(spawn_replication_worker(
            self.primary.clone(),
            secondary,
            self.replication.clone(),
            Duration::from_secs(self.config.replication_interval_secs),
            cancel,
        ))
    }

    /// Spawn the periodic backup timer driving the given hook. Backup
    /// failures are logged, never propagated.
    pub fn spawn_backup(
        &self,
        hook: Arc<dyn BackupHook>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = hook.run().await {
                            warn!(error = %e, "periodic backup failed");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tether_core::HealthStatus;
    use tether_storage::MemorySessionStore;

    /// Store double that counts `get` calls and can be switched to fail
    /// every read, delegating everything to an inner memory store.
    struct FlakyStore {
        inner: MemorySessionStore,
        get_calls: AtomicUsize,
        fail_reads: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemorySessionStore::new(),
                get_calls: AtomicUsize::new(0),
                fail_reads: AtomicBool::new(false),
            }
        }

        fn get_calls(&self) -> usize {
            self.get_calls.load(Ordering::SeqCst)
        }

        fn set_fail_reads(&self, fail: bool) {
            self.fail_reads.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn initialize(&self) -> Result<(), TetherError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), TetherError> {
            Ok(())
        }
        async fn health_check(&self) -> Result<HealthStatus, TetherError> {
            Ok(HealthStatus::Healthy)
        }
        async fn create(&self, session: &Session) -> Result<(), TetherError> {
            self.inner.create(session).await
        }
        async fn get(&self, id: &str) -> Result<Option<Session>, TetherError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(TetherError::Storage {
                    source: "injected read failure".into(),
                });
            }
            self.inner.get(id).await
        }
        async fn update(
            &self,
            id: &str,
            patch: &SessionPatch,
        ) -> Result<Option<Session>, TetherError> {
            self.inner.update(id, patch).await
        }
        async fn upsert(&self, session: &Session) -> Result<(), TetherError> {
            self.inner.upsert(session).await
        }
        async fn delete(&self, id: &str) -> Result<bool, TetherError> {
            self.inner.delete(id).await
        }
        async fn get_user_sessions(
            &self,
            user_id: &str,
            query: &SessionQuery,
        ) -> Result<Vec<Session>, TetherError> {
            self.inner.get_user_sessions(user_id, query).await
        }
        async fn cleanup(&self) -> Result<u64, TetherError> {
            self.inner.cleanup().await
        }
    }

    fn test_config() -> PersistConfig {
        PersistConfig {
            cache_timeout_secs: 300,
            replication_enabled: true,
            replication_interval_secs: 1,
            storage_call_timeout_secs: 5,
        }
    }

    fn make_session(id: &str) -> Session {
        let mut session = Session::new(
            id.to_string(),
            Some("u-1".to_string()),
            Utc::now(),
            chrono::Duration::hours(1),
        );
        session.preferences = json!({"theme": "dark", "language": "en"});
        session
    }

    #[tokio::test]
    async fn create_then_get_hits_cache_not_primary() {
        let primary = Arc::new(FlakyStore::new());
        let coordinator = PersistenceCoordinator::new(primary.clone(), None, test_config());

        coordinator.create(&make_session("s-1")).await.unwrap();

        // Both gets must be cache hits: zero primary reads.
        coordinator.get("s-1").await.unwrap();
        coordinator.get("s-1").await.unwrap();
        assert_eq!(primary.get_calls(), 0);
    }

    #[tokio::test]
    async fn second_get_within_timeout_does_not_reinvoke_primary() {
        let primary = Arc::new(FlakyStore::new());
        let coordinator = PersistenceCoordinator::new(primary.clone(), None, test_config());

        // Seed the primary behind the coordinator's back: first get must miss
        // the cache and hit the store exactly once.
        primary.inner.upsert(&make_session("s-1")).await.unwrap();

        coordinator.get("s-1").await.unwrap();
        assert_eq!(primary.get_calls(), 1);

        coordinator.get("s-1").await.unwrap();
        assert_eq!(primary.get_calls(), 1, "second get must be a cache hit");
    }

    #[tokio::test]
    async fn primary_failure_falls_back_to_secondary() {
        let primary = Arc::new(FlakyStore::new());
        let secondary = Arc::new(MemorySessionStore::new());
        secondary.upsert(&make_session("s-1")).await.unwrap();

        let coordinator = PersistenceCoordinator::new(
            primary.clone(),
            Some(secondary),
            test_config(),
        );

        primary.set_fail_reads(true);
        let session = coordinator.get("s-1").await.unwrap();
        assert_eq!(session.id, "s-1");
    }

    #[tokio::test]
    async fn missing_everywhere_is_not_found() {
        let primary = Arc::new(FlakyStore::new());
        let secondary = Arc::new(MemorySessionStore::new());
        let coordinator =
            PersistenceCoordinator::new(primary, Some(secondary), test_config());

        let err = coordinator.get("ghost").await.unwrap_err();
        assert!(matches!(err, TetherError::NotFound { .. }));
    }

    #[tokio::test]
    async fn primary_failure_without_secondary_surfaces() {
        let primary = Arc::new(FlakyStore::new());
        let coordinator = PersistenceCoordinator::new(primary.clone(), None, test_config());

        primary.set_fail_reads(true);
        let err = coordinator.get("s-1").await.unwrap_err();
        assert!(matches!(err, TetherError::Storage { .. }));
    }

    #[tokio::test]
    async fn update_merges_and_queues_replication() {
        let primary = Arc::new(FlakyStore::new());
        let secondary = Arc::new(MemorySessionStore::new());
        let coordinator = PersistenceCoordinator::new(
            primary.clone(),
            Some(secondary),
            test_config(),
        );

        coordinator.create(&make_session("s-1")).await.unwrap();
        let updated = coordinator
            .update(
                "s-1",
                &SessionPatch {
                    preferences: Some(json!({"theme": "light"})),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.preferences["theme"], "light");
        assert_eq!(updated.preferences["language"], "en");
        assert!(updated.last_activity >= updated.created_at);
        assert!(coordinator.replication_backlog().await > 0);
    }

    #[tokio::test]
    async fn update_missing_session_is_not_found() {
        let primary = Arc::new(FlakyStore::new());
        let coordinator = PersistenceCoordinator::new(primary, None, test_config());

        let err = coordinator
            .update("ghost", &SessionPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_cancels_pending_replication() {
        let primary = Arc::new(FlakyStore::new());
        let secondary = Arc::new(MemorySessionStore::new());
        let coordinator = PersistenceCoordinator::new(
            primary,
            Some(secondary),
            test_config(),
        );

        coordinator.create(&make_session("s-1")).await.unwrap();
        assert_eq!(coordinator.replication_backlog().await, 1);

        assert!(coordinator.delete("s-1").await.unwrap());
        assert_eq!(coordinator.replication_backlog().await, 0);
        assert!(matches!(
            coordinator.get("s-1").await.unwrap_err(),
            TetherError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn create_rejects_invalid_sessions() {
        let primary = Arc::new(FlakyStore::new());
        let coordinator = PersistenceCoordinator::new(primary, None, test_config());

        let mut bad = make_session("");
        assert!(matches!(
            coordinator.create(&bad).await.unwrap_err(),
            TetherError::Validation(_)
        ));

        bad = make_session("s-bad");
        bad.last_activity = bad.created_at - chrono::Duration::seconds(1);
        assert!(matches!(
            coordinator.create(&bad).await.unwrap_err(),
            TetherError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn cleanup_returns_primary_count_only() {
        let primary = Arc::new(FlakyStore::new());
        let secondary = Arc::new(MemorySessionStore::new());

        let mut expired = make_session("s-expired");
        expired.expires_at = Utc::now() - chrono::Duration::minutes(1);
        primary.inner.upsert(&expired).await.unwrap();
        secondary.upsert(&expired).await.unwrap();
        primary.inner.upsert(&make_session("s-alive")).await.unwrap();

        let coordinator = PersistenceCoordinator::new(
            primary.clone(),
            Some(secondary.clone()),
            test_config(),
        );

        let removed = coordinator.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(secondary.get("s-expired").await.unwrap().is_none());
        assert!(primary.inner.get("s-alive").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn replication_worker_mirrors_writes() {
        let primary = Arc::new(FlakyStore::new());
        let secondary = Arc::new(MemorySessionStore::new());
        let coordinator = PersistenceCoordinator::new(
            primary,
            Some(secondary.clone()),
            test_config(),
        );

        coordinator.create(&make_session("s-1")).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = coordinator.spawn_replication(cancel.clone()).unwrap();

        // Shutdown triggers the final flush; no need to wait for a tick.
        cancel.cancel();
        handle.await.unwrap();

        assert!(secondary.get("s-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn export_produces_requested_format() {
        let primary = Arc::new(FlakyStore::new());
        let coordinator = PersistenceCoordinator::new(primary, None, test_config());
        coordinator.create(&make_session("s-1")).await.unwrap();

        let blob = coordinator
            .export_all("u-1", &SessionQuery::default(), ExportFormat::JsonLines)
            .await
            .unwrap();
        assert_eq!(blob.lines().count(), 1);
    }
}
