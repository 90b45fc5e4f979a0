// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort asynchronous replication to the secondary store.
//!
//! Writes enqueue the session id into a pending set; a background worker
//! drains the set on a fixed interval and mirrors each session from the
//! primary to the secondary. Failures re-queue the id and are never surfaced
//! to the caller -- the secondary is a fallback, not a strict-consistency
//! replica.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tether_core::{SessionStore, TetherError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pending session ids awaiting mirroring. A set, not a queue: repeated
/// writes to the same session collapse into one mirror pass.
pub struct ReplicationQueue {
    pending: Mutex<HashSet<String>>,
}

impl ReplicationQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub async fn enqueue(&self, id: &str) {
        self.pending.lock().await.insert(id.to_string());
    }

    /// Drop a pending mirror, e.g. after the session was deleted.
    pub async fn cancel(&self, id: &str) {
        self.pending.lock().await.remove(id);
    }

    /// Take the whole pending set, leaving it empty.
    pub async fn drain(&self) -> Vec<String> {
        self.pending.lock().await.drain().collect()
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for ReplicationQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a single replication flush, for logging and tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub mirrored: usize,
    pub deleted: usize,
    pub requeued: usize,
}

/// Mirror every pending session from `primary` to `secondary` once.
///
/// A session missing on the primary is mirrored as a delete (it was removed
/// while queued). Any backend failure re-queues the id for the next tick.
pub async fn flush_once(
    primary: &Arc<dyn SessionStore>,
    secondary: &Arc<dyn SessionStore>,
    queue: &ReplicationQueue,
) -> FlushStats {
    let mut stats = FlushStats::default();

    for id in queue.drain().await {
        match replicate_one(primary, secondary, &id).await {
            Ok(true) => stats.mirrored += 1,
            Ok(false) => stats.deleted += 1,
            Err(e) => {
                warn!(
                    session_id = id.as_str(),
                    error = %e,
                    "replication failed, re-queued"
                );
                queue.enqueue(&id).await;
                stats.requeued += 1;
            }
        }
    }

    if stats != FlushStats::default() {
        debug!(
            mirrored = stats.mirrored,
            deleted = stats.deleted,
            requeued = stats.requeued,
            "replication flush complete"
        );
    }
    stats
}

/// Returns `Ok(true)` when the session was mirrored, `Ok(false)` when it was
/// absent on the primary and deleted from the secondary instead.
async fn replicate_one(
    primary: &Arc<dyn SessionStore>,
    secondary: &Arc<dyn SessionStore>,
    id: &str,
) -> Result<bool, TetherError> {
    match primary.get(id).await? {
        Some(session) => {
            secondary.upsert(&session).await?;
            Ok(true)
        }
        None => {
            secondary.delete(id).await?;
            Ok(false)
        }
    }
}

/// Spawn the interval-driven replication worker. Runs until the cancellation
/// token fires, then performs one final flush so shutdown does not strand
/// pending mirrors.
pub fn spawn_replication_worker(
    primary: Arc<dyn SessionStore>,
    secondary: Arc<dyn SessionStore>,
    queue: Arc<ReplicationQueue>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh worker waits
        // a full interval before its first flush.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    flush_once(&primary, &secondary, &queue).await;
                }
                _ = cancel.cancelled() => {
                    debug!("replication worker stopping, final flush");
                    flush_once(&primary, &secondary, &queue).await;
                    break;
                }
            }
        }
    })
}
