// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The synchronization service: device registry, event queues, and conflict
//! reconciliation.
//!
//! Synchronization is event-driven, not state-driven: devices submit
//! mutation events, the service detects ordering disagreements with a
//! last-writer-clock heuristic, and reconciled events are broadcast to every
//! other device tracking the session. Device registration never fails the
//! caller -- losing sync bookkeeping for a disconnected device is a
//! sync-quality issue, not a correctness issue.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tether_bus::{BusEvent, EventBus};
use tether_config::model::SyncConfig;
use tether_core::{
    merge, ConflictType, DeviceSync, ResolutionStrategy, Session, SessionPatch, SyncConflict,
    SyncEvent, SyncEventKind, DELETED_AT, MARKED_FOR_DELETION,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Point-in-time counters for monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub connected_devices: usize,
    pub total_sessions: usize,
    pub pending_events: usize,
    pub total_conflicts: usize,
    pub sync_queue_size: usize,
}

/// Result of applying a batch of events against a session.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The reconciled session after all applicable events merged.
    pub session: Session,
    /// Number of events that merged successfully.
    pub applied: usize,
    /// Conflicts detected during application (also recorded in the ledger).
    pub conflicts: Vec<SyncConflict>,
}

struct SyncState {
    devices: HashMap<String, DeviceSync>,
    /// session id -> devices tracking it
    session_devices: HashMap<String, HashSet<String>>,
    /// device id -> sessions it tracks
    device_sessions: HashMap<String, HashSet<String>>,
    /// Bounded per-session event history, oldest first.
    history: HashMap<String, VecDeque<SyncEvent>>,
    /// Central queue of events awaiting delivery distribution.
    queue: VecDeque<SyncEvent>,
    /// Unresolved conflicts per session.
    conflicts: HashMap<String, Vec<SyncConflict>>,
    /// Monotonic per-session counter, incremented on every accepted write.
    /// Surfaced in conflict records so strict callers can layer a version
    /// check on top of the clock heuristic.
    session_versions: HashMap<String, u64>,
}

/// Owns all cross-device sync bookkeeping. Constructed once per process and
/// shared via `Arc`; the durable store is deliberately not reachable from
/// here (callers pass the current session in and persist the result).
pub struct SyncService {
    config: SyncConfig,
    bus: EventBus,
    state: RwLock<SyncState>,
}

impl SyncService {
    pub fn new(config: SyncConfig, bus: EventBus) -> Self {
        Self {
            config,
            bus,
            state: RwLock::new(SyncState {
                devices: HashMap::new(),
                session_devices: HashMap::new(),
                device_sessions: HashMap::new(),
                history: HashMap::new(),
                queue: VecDeque::new(),
                conflicts: HashMap::new(),
                session_versions: HashMap::new(),
            }),
        }
    }

    /// Register a device for sync. Re-registering resets its bookkeeping
    /// (pending events, version, tracked sessions). Never fails the caller.
    pub async fn register_device(&self, device_id: &str, device_info: Value) {
        let mut state = self.state.write().await;
        if state.devices.contains_key(device_id) {
            debug!(device_id, "device re-registered, resetting sync bookkeeping");
            Self::remove_memberships(&mut state, device_id);
        }
        state.devices.insert(
            device_id.to_string(),
            DeviceSync::new(device_id.to_string(), device_info, Utc::now()),
        );
        drop(state);

        info!(device_id, "device registered for sync");
        self.bus.publish(BusEvent::DeviceRegistered {
            device_id: device_id.to_string(),
        });
    }

    /// Unregister a device and purge its authored, undelivered events from
    /// the central queue. Absorbed if the device is unknown.
    pub async fn unregister_device(&self, device_id: &str) {
        let mut state = self.state.write().await;
        if state.devices.remove(device_id).is_none() {
            debug!(device_id, "unregister for unknown device ignored");
            return;
        }
        Self::remove_memberships(&mut state, device_id);
        let before = state.queue.len();
        state.queue.retain(|event| event.device_id != device_id);
        let purged = before - state.queue.len();
        drop(state);

        info!(device_id, purged, "device unregistered");
    }

    fn remove_memberships(state: &mut SyncState, device_id: &str) {
        if let Some(sessions) = state.device_sessions.remove(device_id) {
            for session_id in sessions {
                if let Some(devices) = state.session_devices.get_mut(&session_id) {
                    devices.remove(device_id);
                    if devices.is_empty() {
                        state.session_devices.remove(&session_id);
                    }
                }
            }
        }
    }

    /// Subscribe a device to a session's broadcasts. Unknown devices are
    /// absorbed with a warning.
    pub async fn track_session(&self, device_id: &str, session_id: &str) {
        let mut state = self.state.write().await;
        if !state.devices.contains_key(device_id) {
            warn!(device_id, session_id, "track_session for unregistered device ignored");
            return;
        }
        state
            .session_devices
            .entry(session_id.to_string())
            .or_default()
            .insert(device_id.to_string());
        state
            .device_sessions
            .entry(device_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        debug!(device_id, session_id, "session tracked");
    }

    pub async fn untrack_session(&self, device_id: &str, session_id: &str) {
        let mut state = self.state.write().await;
        if let Some(devices) = state.session_devices.get_mut(session_id) {
            devices.remove(device_id);
            if devices.is_empty() {
                state.session_devices.remove(session_id);
            }
        }
        if let Some(sessions) = state.device_sessions.get_mut(device_id) {
            sessions.remove(session_id);
        }
        debug!(device_id, session_id, "session untracked");
    }

    /// Record a device's mutation intent. Appends to the central queue and
    /// the bounded per-session history; under real-time mode, delivery
    /// processing runs immediately instead of waiting for the periodic tick.
    pub async fn queue_sync_event(
        &self,
        session_id: &str,
        device_id: &str,
        kind: SyncEventKind,
        data: Value,
        version: u64,
    ) -> SyncEvent {
        let event = SyncEvent {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            device_id: device_id.to_string(),
            timestamp: Utc::now(),
            kind,
            data,
            version,
        };

        let mut state = self.state.write().await;
        state.queue.push_back(event.clone());

        let max_history = self.config.max_history_per_session;
        let history = state.history.entry(session_id.to_string()).or_default();
        history.push_back(event.clone());
        while history.len() > max_history {
            history.pop_front();
        }

        if let Some(device) = state.devices.get_mut(device_id) {
            device.sync_version = device.sync_version.max(version);
        }
        drop(state);

        debug!(
            session_id,
            device_id,
            kind = %event.kind,
            version,
            "sync event queued"
        );

        if self.config.realtime {
            self.process_queue().await;
        }
        event
    }

    /// Distribute queued events to every device tracking their session,
    /// excluding the authoring device (echo-back prevention). Emits one
    /// broadcast notification per (session, target device) pair.
    pub async fn process_queue(&self) {
        let mut state = self.state.write().await;
        let events: Vec<SyncEvent> = state.queue.drain(..).collect();
        if events.is_empty() {
            return;
        }

        let mut delivered: HashMap<(String, String), usize> = HashMap::new();
        for event in events {
            let Some(targets) = state.session_devices.get(&event.session_id) else {
                continue;
            };
            let targets: Vec<String> = targets
                .iter()
                .filter(|id| **id != event.device_id)
                .cloned()
                .collect();
            for target in targets {
                if let Some(device) = state.devices.get_mut(&target) {
                    device.pending_events.push(event.clone());
                    *delivered
                        .entry((event.session_id.clone(), target))
                        .or_default() += 1;
                }
            }
        }
        drop(state);

        for ((session_id, target_device_id), event_count) in delivered {
            debug!(
                session_id = session_id.as_str(),
                device_id = target_device_id.as_str(),
                event_count,
                "sync events delivered"
            );
            self.bus.publish(BusEvent::SyncEventsBroadcast {
                session_id,
                target_device_id,
                event_count,
            });
        }
    }

    /// Pull-model retrieval for devices that poll instead of receiving
    /// pushed broadcasts. Drains and returns the device's delivery queue,
    /// optionally filtered by session and a lower timestamp bound, sorted by
    /// timestamp ascending.
    pub async fn get_pending_sync_events(
        &self,
        device_id: &str,
        session_id: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Vec<SyncEvent> {
        let mut state = self.state.write().await;
        let Some(device) = state.devices.get_mut(device_id) else {
            return Vec::new();
        };

        let matches = |event: &SyncEvent| {
            session_id.is_none_or(|sid| event.session_id == sid)
                && since.is_none_or(|ts| event.timestamp > ts)
        };

        let mut taken = Vec::new();
        let mut kept = Vec::new();
        for event in device.pending_events.drain(..) {
            if matches(&event) {
                taken.push(event);
            } else {
                kept.push(event);
            }
        }
        device.pending_events = kept;
        device.last_sync_time = Utc::now();

        taken.sort_by_key(|event| event.timestamp);
        taken
    }

    /// Apply a batch of events against the given session state.
    ///
    /// Events are applied in timestamp order, not arrival order. `Create`
    /// events merge unconditionally; `Update` events go through conflict
    /// detection first; `Delete` events only record deletion intent in the
    /// session metadata, leaving physical deletion to the caller. Malformed
    /// payloads are swallowed per-event; the batch returns whatever merged.
    pub async fn apply_sync_events(
        &self,
        session_id: &str,
        events: &[SyncEvent],
        current: &Session,
    ) -> SyncOutcome {
        let mut ordered: Vec<SyncEvent> = events.to_vec();
        ordered.sort_by_key(|event| event.timestamp);

        let mut session = current.clone();
        let mut applied = 0usize;
        let mut new_conflicts: Vec<SyncConflict> = Vec::new();

        let mut state = self.state.write().await;
        for event in &ordered {
            let patch = match event.patch() {
                Ok(patch) => patch,
                Err(e) => {
                    warn!(
                        session_id,
                        event_id = event.id.as_str(),
                        error = %e,
                        "malformed sync event skipped"
                    );
                    continue;
                }
            };

            match event.kind {
                SyncEventKind::Create => {
                    merge::apply_patch(&mut session, &patch, event.timestamp);
                    applied += 1;
                }
                SyncEventKind::Update => {
                    // The session has already advanced past the point this
                    // event was generated from: the device wrote from stale
                    // state.
                    if session.last_activity > event.timestamp {
                        let local_version =
                            state.session_versions.get(session_id).copied().unwrap_or(0);
                        let conflict = SyncConflict {
                            session_id: session_id.to_string(),
                            conflict_type: ConflictType::ConcurrentUpdate,
                            local_version,
                            remote_version: event.version,
                            local_data: serde_json::to_value(&session)
                                .unwrap_or(Value::Null),
                            remote_data: event.data.clone(),
                            timestamp: Utc::now(),
                        };
                        if let Some(device) = state.devices.get_mut(&event.device_id) {
                            device.conflict_count += 1;
                        }
                        new_conflicts.push(conflict);
                        continue;
                    }
                    // Advance to the event's logical time, not wall clock,
                    // so later events in the same sorted batch do not
                    // spuriously conflict with this one.
                    merge::apply_patch(&mut session, &patch, event.timestamp);
                    applied += 1;
                }
                SyncEventKind::Delete => {
                    if !session.metadata.is_object() {
                        session.metadata = Value::Object(Default::default());
                    }
                    session.metadata[MARKED_FOR_DELETION] = Value::Bool(true);
                    session.metadata[DELETED_AT] = Value::String(event.timestamp.to_rfc3339());
                    session.touch(event.timestamp);
                    applied += 1;
                }
            }

            let counter = state
                .session_versions
                .entry(session_id.to_string())
                .or_insert(0);
            *counter += 1;
        }

        if !new_conflicts.is_empty() {
            state
                .conflicts
                .entry(session_id.to_string())
                .or_default()
                .extend(new_conflicts.iter().cloned());
        }
        drop(state);

        if !new_conflicts.is_empty() {
            info!(
                session_id,
                conflicts = new_conflicts.len(),
                "sync conflicts detected"
            );
        }

        SyncOutcome {
            session,
            applied,
            conflicts: new_conflicts,
        }
    }

    /// Number of unresolved conflicts recorded for a session.
    pub async fn conflict_count(&self, session_id: &str) -> usize {
        self.state
            .read()
            .await
            .conflicts
            .get(session_id)
            .map_or(0, Vec::len)
    }

    /// Resolve a session's conflict ledger with the chosen strategy.
    ///
    /// Returns `None` when the ledger is empty. Clears the ledger entry and
    /// emits a `ConflictsResolved` notification; the caller persists the
    /// returned session.
    pub async fn resolve_conflicts(
        &self,
        session_id: &str,
        strategy: ResolutionStrategy,
        current: &Session,
    ) -> Option<Session> {
        let conflicts = {
            let mut state = self.state.write().await;
            state.conflicts.remove(session_id)?
        };
        let resolved_count = conflicts.len();

        let mut session = current.clone();
        match strategy {
            ResolutionStrategy::AcceptLocal => {
                // Remote data is discarded entirely.
            }
            ResolutionStrategy::AcceptRemote => {
                for conflict in &conflicts {
                    match serde_json::from_value::<SessionPatch>(conflict.remote_data.clone()) {
                        Ok(patch) => overwrite_fields(&mut session, &patch, Utc::now()),
                        Err(e) => warn!(
                            session_id,
                            error = %e,
                            "unparseable remote data skipped during resolution"
                        ),
                    }
                }
            }
            ResolutionStrategy::Merge => {
                for conflict in &conflicts {
                    match serde_json::from_value::<SessionPatch>(conflict.remote_data.clone()) {
                        Ok(mut patch) => {
                            // History merges by union-by-id instead of the
                            // ordinary wholesale replacement.
                            if let Some(remote_history) = patch.conversation_history.take() {
                                session.conversation_history = merge::merge_history(
                                    &session.conversation_history,
                                    &remote_history,
                                );
                            }
                            merge::apply_patch(&mut session, &patch, Utc::now());
                        }
                        Err(e) => warn!(
                            session_id,
                            error = %e,
                            "unparseable remote data skipped during resolution"
                        ),
                    }
                }
            }
        }
        session.touch(Utc::now());

        info!(
            session_id,
            strategy = %strategy,
            resolved = resolved_count,
            "conflicts resolved"
        );
        self.bus.publish(BusEvent::ConflictsResolved {
            session_id: session_id.to_string(),
            strategy: strategy.to_string(),
            resolved: resolved_count,
        });

        Some(session)
    }

    /// Stamp a device's last successful synchronization time.
    pub async fn mark_device_synced(&self, device_id: &str) {
        let mut state = self.state.write().await;
        if let Some(device) = state.devices.get_mut(device_id) {
            device.last_sync_time = Utc::now();
        }
    }

    /// Snapshot of current bookkeeping sizes.
    pub async fn get_sync_stats(&self) -> SyncStats {
        let state = self.state.read().await;
        SyncStats {
            connected_devices: state.devices.len(),
            total_sessions: state.session_devices.len(),
            pending_events: state
                .devices
                .values()
                .map(|d| d.pending_events.len())
                .sum(),
            total_conflicts: state.conflicts.values().map(Vec::len).sum(),
            sync_queue_size: state.queue.len(),
        }
    }

    /// Evict history events and conflict records older than the retention
    /// window. Returns (events removed, conflicts removed).
    pub async fn cleanup_stale(&self, now: DateTime<Utc>) -> (usize, usize) {
        let retention = chrono::Duration::hours(self.config.retention_hours as i64);
        let cutoff = now - retention;

        let mut state = self.state.write().await;

        let mut events_removed = 0usize;
        state.history.retain(|_, events| {
            let before = events.len();
            events.retain(|event| event.timestamp > cutoff);
            events_removed += before - events.len();
            !events.is_empty()
        });

        let mut conflicts_removed = 0usize;
        state.conflicts.retain(|_, conflicts| {
            let before = conflicts.len();
            conflicts.retain(|conflict| conflict.timestamp > cutoff);
            conflicts_removed += before - conflicts.len();
            !conflicts.is_empty()
        });
        drop(state);

        if events_removed > 0 || conflicts_removed > 0 {
            debug!(events_removed, conflicts_removed, "stale sync data swept");
        }
        (events_removed, conflicts_removed)
    }

    /// Spawn the periodic drain + retention sweep. Runs until cancelled,
    /// with a final drain on shutdown.
    pub fn spawn_sync_loop(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let interval = Duration::from_secs(service.config.sync_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        service.process_queue().await;
                        service.cleanup_stale(Utc::now()).await;
                    }
                    _ = cancel.cancelled() => {
                        service.process_queue().await;
                        break;
                    }
                }
            }
        })
    }
}

/// Field-level wholesale overwrite, used by the `AcceptRemote` strategy.
/// Unlike the ordinary merge, nested objects are not descended into.
fn overwrite_fields(session: &mut Session, patch: &SessionPatch, now: DateTime<Utc>) {
    if let Some(user_id) = &patch.user_id {
        session.user_id = Some(user_id.clone());
    }
    if let Some(expires_at) = patch.expires_at {
        session.expires_at = expires_at;
    }
    if let Some(browser_state) = &patch.browser_state {
        session.browser_state = browser_state.clone();
    }
    if let Some(history) = &patch.conversation_history {
        session.conversation_history = history.clone();
    }
    if let Some(preferences) = &patch.preferences {
        session.preferences = preferences.clone();
    }
    if let Some(metadata) = &patch.metadata {
        session.metadata = metadata.clone();
    }
    if let Some(device_info) = &patch.device_info {
        session.device_info = device_info.clone();
    }
    session.touch(patch.last_activity.unwrap_or(now));
}
