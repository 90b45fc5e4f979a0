// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store doubles for coordinator and end-to-end tests.
//!
//! `CountingStore` wraps any real store and counts calls per operation;
//! `FailingStore` can be switched to fail reads or writes on demand. Both
//! implement the real `SessionStore` contract so they compose with the
//! coordinator exactly like production backends.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use tether_core::{
    HealthStatus, Session, SessionPatch, SessionQuery, SessionStore, TetherError,
};

/// Call counters exposed by [`CountingStore`].
#[derive(Debug, Default)]
pub struct CallCounts {
    pub create: AtomicUsize,
    pub get: AtomicUsize,
    pub update: AtomicUsize,
    pub upsert: AtomicUsize,
    pub delete: AtomicUsize,
    pub list: AtomicUsize,
    pub cleanup: AtomicUsize,
}

/// Pass-through store that counts every call.
pub struct CountingStore {
    inner: Arc<dyn SessionStore>,
    pub counts: CallCounts,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn SessionStore>) -> Self {
        Self {
            inner,
            counts: CallCounts::default(),
        }
    }

    pub fn gets(&self) -> usize {
        self.counts.get.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn initialize(&self) -> Result<(), TetherError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), TetherError> {
        self.inner.close().await
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        self.inner.health_check().await
    }

    async fn create(&self, session: &Session) -> Result<(), TetherError> {
        self.counts.create.fetch_add(1, Ordering::SeqCst);
        self.inner.create(session).await
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, TetherError> {
        self.counts.get.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }

    async fn update(
        &self,
        id: &str,
        patch: &SessionPatch,
    ) -> Result<Option<Session>, TetherError> {
        self.counts.update.fetch_add(1, Ordering::SeqCst);
        self.inner.update(id, patch).await
    }

    async fn upsert(&self, session: &Session) -> Result<(), TetherError> {
        self.counts.upsert.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(session).await
    }

    async fn delete(&self, id: &str) -> Result<bool, TetherError> {
        self.counts.delete.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(id).await
    }

    async fn get_user_sessions(
        &self,
        user_id: &str,
        query: &SessionQuery,
    ) -> Result<Vec<Session>, TetherError> {
        self.counts.list.fetch_add(1, Ordering::SeqCst);
        self.inner.get_user_sessions(user_id, query).await
    }

    async fn cleanup(&self) -> Result<u64, TetherError> {
        self.counts.cleanup.fetch_add(1, Ordering::SeqCst);
        self.inner.cleanup().await
    }
}

/// Pass-through store with injectable read/write failures.
pub struct FailingStore {
    inner: Arc<dyn SessionStore>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn SessionStore>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn read_gate(&self) -> Result<(), TetherError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(TetherError::Storage {
                source: "injected read failure".into(),
            });
        }
        Ok(())
    }

    fn write_gate(&self) -> Result<(), TetherError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TetherError::Storage {
                source: "injected write failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn initialize(&self) -> Result<(), TetherError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), TetherError> {
        self.inner.close().await
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        if self.fail_reads.load(Ordering::SeqCst) || self.fail_writes.load(Ordering::SeqCst) {
            return Ok(HealthStatus::Unhealthy("failures injected".into()));
        }
        self.inner.health_check().await
    }

    async fn create(&self, session: &Session) -> Result<(), TetherError> {
        self.write_gate()?;
        self.inner.create(session).await
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, TetherError> {
        self.read_gate()?;
        self.inner.get(id).await
    }

    async fn update(
        &self,
        id: &str,
        patch: &SessionPatch,
    ) -> Result<Option<Session>, TetherError> {
        self.write_gate()?;
        self.inner.update(id, patch).await
    }

    async fn upsert(&self, session: &Session) -> Result<(), TetherError> {
        self.write_gate()?;
        self.inner.upsert(session).await
    }

    async fn delete(&self, id: &str) -> Result<bool, TetherError> {
        self.write_gate()?;
        self.inner.delete(id).await
    }

    async fn get_user_sessions(
        &self,
        user_id: &str,
        query: &SessionQuery,
    ) -> Result<Vec<Session>, TetherError> {
        self.read_gate()?;
        self.inner.get_user_sessions(user_id, query).await
    }

    async fn cleanup(&self) -> Result<u64, TetherError> {
        self.write_gate()?;
        self.inner.cleanup().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tether_storage::MemorySessionStore;

    fn make_session(id: &str) -> Session {
        Session::new(id.to_string(), None, Utc::now(), chrono::Duration::hours(1))
    }

    #[tokio::test]
    async fn counting_store_counts_calls() {
        let store = CountingStore::new(Arc::new(MemorySessionStore::new()));
        store.create(&make_session("s-1")).await.unwrap();
        store.get("s-1").await.unwrap();
        store.get("s-1").await.unwrap();
        assert_eq!(store.gets(), 2);
        assert_eq!(store.counts.create.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_store_injects_read_failures() {
        let store = FailingStore::new(Arc::new(MemorySessionStore::new()));
        store.create(&make_session("s-1")).await.unwrap();

        store.fail_reads(true);
        assert!(store.get("s-1").await.is_err());

        store.fail_reads(false);
        assert!(store.get("s-1").await.unwrap().is_some());
    }
}
