// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local TTL read cache in front of the primary store.
//!
//! An entry is fresh while `now - last_accessed < timeout`; every hit
//! refreshes `last_accessed`. Entry lifetime is bounded by time-in-cache,
//! independent of session expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tether_core::Session;
use tokio::sync::RwLock;

struct CacheEntry {
    session: Session,
    last_accessed: Instant,
}

/// Time-bounded read accelerator. Owned exclusively by the persistence
/// coordinator; never shared across processes.
pub struct SessionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    timeout: Duration,
}

impl SessionCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Fetch a fresh entry, refreshing its `last_accessed`. Stale entries are
    /// evicted on the spot and reported as a miss.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(id) {
            Some(entry) if entry.last_accessed.elapsed() < self.timeout => {
                entry.last_accessed = Instant::now();
                Some(entry.session.clone())
            }
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Insert or refresh an entry.
    pub async fn put(&self, session: Session) {
        self.entries.write().await.insert(
            session.id.clone(),
            CacheEntry {
                session,
                last_accessed: Instant::now(),
            },
        );
    }

    pub async fn evict(&self, id: &str) {
        self.entries.write().await.remove(id);
    }

    /// Drop every entry past the cache timeout. Returns the eviction count.
    pub async fn evict_stale(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let timeout = self.timeout;
        entries.retain(|_, entry| entry.last_accessed.elapsed() < timeout);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
