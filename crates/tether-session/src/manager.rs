// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session facade: thin orchestration over the persistence coordinator
//! and the synchronization service.
//!
//! Forwards writes to the coordinator, mirrors them as sync events when
//! cross-device sync is enabled, and emits lifecycle notifications on the
//! bus. Contains no storage or reconciliation logic of its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_bus::{BusEvent, EventBus};
use tether_config::model::SessionConfig;
use tether_core::{
    merge, ResolutionStrategy, Session, SessionPatch, SessionQuery, SyncEventKind, TetherError,
};
use tether_persist::PersistenceCoordinator;
use tether_sync::SyncService;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Request payload for creating a session.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CreateSessionRequest {
    /// Caller-chosen id; a UUID is generated when absent.
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    /// Merged over the configured default preferences.
    pub preferences: Option<Value>,
    pub browser_state: Option<Value>,
    pub metadata: Option<Value>,
    pub device_info: Option<Value>,
    /// Overrides the configured default lifetime.
    pub ttl_hours: Option<u64>,
    /// Originating device, when the create should also be synced.
    pub origin: Option<DeviceOrigin>,
}

/// Identifies the device a mutation originated from, with that device's
/// monotonic event counter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceOrigin {
    pub device_id: String,
    pub version: u64,
}

/// Result of a pull-based device synchronization pass.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// The reconciled session, `None` when it was physically deleted.
    pub session: Option<Session>,
    pub applied: usize,
    pub conflicts: usize,
    pub deleted: bool,
}

/// Facade exposing session CRUD plus the sync entry points consumed by the
/// HTTP layer and the automation engine.
pub struct SessionManager {
    coordinator: Arc<PersistenceCoordinator>,
    sync: Option<Arc<SyncService>>,
    bus: EventBus,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        coordinator: Arc<PersistenceCoordinator>,
        sync: Option<Arc<SyncService>>,
        bus: EventBus,
        config: SessionConfig,
    ) -> Self {
        Self {
            coordinator,
            sync,
            bus,
            config,
        }
    }

    pub fn sync_service(&self) -> Option<&Arc<SyncService>> {
        self.sync.as_ref()
    }

    /// Create a session with the configured default preferences merged under
    /// the request's, write it durably, and announce it.
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<Session, TetherError> {
        let id = request
            .session_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let ttl_hours = request.ttl_hours.unwrap_or(self.config.default_ttl_hours);
        let now = Utc::now();

        let mut session = Session::new(
            id,
            request.user_id,
            now,
            chrono::Duration::hours(ttl_hours as i64),
        );

        session.preferences = self.config.default_preferences.clone();
        if let Some(preferences) = &request.preferences {
            merge::deep_merge(&mut session.preferences, preferences);
        }
        if let Some(browser_state) = request.browser_state {
            session.browser_state = browser_state;
        }
        if let Some(metadata) = request.metadata {
            session.metadata = metadata;
        }
        if let Some(device_info) = request.device_info {
            session.device_info = device_info;
        }

        let session = self.coordinator.create(&session).await?;

        info!(
            session_id = session.id.as_str(),
            user_id = session.user_id.as_deref().unwrap_or("<anonymous>"),
            "session created"
        );
        self.bus.publish(BusEvent::SessionCreated {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
        });

        if let Some(origin) = &request.origin {
            self.enqueue_sync(
                &session.id,
                origin,
                SyncEventKind::Create,
                session_snapshot(&session),
            )
            .await;
        }

        Ok(session)
    }

    /// Fetch a session. Absence is `None`, not an error.
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, TetherError> {
        match self.coordinator.get(id).await {
            Ok(session) => Ok(Some(session)),
            Err(TetherError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Apply a partial update. Returns the merged session, or `None` when
    /// the session does not exist in either store.
    pub async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
        origin: Option<DeviceOrigin>,
    ) -> Result<Option<Session>, TetherError> {
        let session = match self.coordinator.update(id, &patch).await {
            Ok(session) => session,
            Err(TetherError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        self.bus.publish(BusEvent::SessionUpdated {
            session_id: id.to_string(),
        });

        if let Some(origin) = &origin {
            let data = serde_json::to_value(&patch).unwrap_or(Value::Null);
            self.enqueue_sync(id, origin, SyncEventKind::Update, data).await;
        }

        Ok(Some(session))
    }

    /// Physically delete a session. When the delete originated from a
    /// device, the intent is also propagated to the other devices.
    pub async fn delete_session(
        &self,
        id: &str,
        origin: Option<DeviceOrigin>,
    ) -> Result<bool, TetherError> {
        let removed = self.coordinator.delete(id).await?;
        if !removed {
            return Ok(false);
        }

        self.bus.publish(BusEvent::SessionDeleted {
            session_id: id.to_string(),
        });

        if let Some(origin) = &origin {
            self.enqueue_sync(id, origin, SyncEventKind::Delete, Value::Object(Default::default()))
                .await;
        }

        Ok(true)
    }

    pub async fn get_user_sessions(
        &self,
        user_id: &str,
        query: &SessionQuery,
    ) -> Result<Vec<Session>, TetherError> {
        self.coordinator.get_user_sessions(user_id, query).await
    }

    /// Register a device with the sync service. A no-op (with a warning)
    /// when sync is disabled -- registration never fails the caller.
    pub async fn register_device_for_sync(&self, device_id: &str, device_info: Value) {
        match &self.sync {
            Some(sync) => sync.register_device(device_id, device_info).await,
            None => warn!(device_id, "device registration ignored: sync disabled"),
        }
    }

    /// Subscribe a device to a session's broadcasts.
    pub async fn track_session(&self, device_id: &str, session_id: &str) {
        if let Some(sync) = &self.sync {
            sync.track_session(device_id, session_id).await;
        }
    }

    pub async fn untrack_session(&self, device_id: &str, session_id: &str) {
        if let Some(sync) = &self.sync {
            sync.untrack_session(device_id, session_id).await;
        }
    }

    /// Pull a device's pending events for a session, reconcile them against
    /// the current state, and persist the result. A session reconciled into
    /// the marked-for-deletion state is physically deleted here.
    pub async fn synchronize_session(
        &self,
        id: &str,
        device_id: &str,
    ) -> Result<SyncReport, TetherError> {
        let sync = self.require_sync()?;

        let events = sync.get_pending_sync_events(device_id, Some(id), None).await;

        let current = match self.coordinator.get(id).await {
            Ok(session) => session,
            Err(TetherError::NotFound { .. }) if !events.is_empty() => {
                // Created on another device and not yet materialized here:
                // reconcile into a fresh shell.
                Session::new(
                    id.to_string(),
                    None,
                    Utc::now(),
                    chrono::Duration::hours(self.config.default_ttl_hours as i64),
                )
            }
            Err(e) => return Err(e),
        };

        if events.is_empty() {
            sync.mark_device_synced(device_id).await;
            return Ok(SyncReport {
                session: Some(current),
                applied: 0,
                conflicts: 0,
                deleted: false,
            });
        }

        let outcome = sync.apply_sync_events(id, &events, &current).await;

        if outcome.session.marked_for_deletion() {
            self.coordinator.delete(id).await?;
            sync.mark_device_synced(device_id).await;
            self.bus.publish(BusEvent::SessionDeleted {
                session_id: id.to_string(),
            });
            debug!(session_id = id, "session deleted after sync reconciliation");
            return Ok(SyncReport {
                session: None,
                applied: outcome.applied,
                conflicts: outcome.conflicts.len(),
                deleted: true,
            });
        }

        self.coordinator.write_through(&outcome.session).await?;
        sync.mark_device_synced(device_id).await;

        self.bus.publish(BusEvent::SessionUpdated {
            session_id: id.to_string(),
        });

        Ok(SyncReport {
            session: Some(outcome.session),
            applied: outcome.applied,
            conflicts: outcome.conflicts.len(),
            deleted: false,
        })
    }

    /// Resolve a session's conflict ledger and persist the result. Returns
    /// `None` when there was nothing to resolve.
    pub async fn resolve_session_conflicts(
        &self,
        id: &str,
        strategy: ResolutionStrategy,
    ) -> Result<Option<Session>, TetherError> {
        let sync = self.require_sync()?;
        let current = self.coordinator.get(id).await?;

        let Some(resolved) = sync.resolve_conflicts(id, strategy, &current).await else {
            return Ok(None);
        };
        self.coordinator.write_through(&resolved).await?;
        Ok(Some(resolved))
    }

    /// Strict-caller gate: error when unresolved conflicts exist for the
    /// session. Never raised automatically.
    pub async fn ensure_no_conflicts(&self, id: &str) -> Result<(), TetherError> {
        let Some(sync) = &self.sync else {
            return Ok(());
        };
        let pending = sync.conflict_count(id).await;
        if pending > 0 {
            return Err(TetherError::ConflictUnresolved {
                session_id: id.to_string(),
                pending,
            });
        }
        Ok(())
    }

    /// Run one expiry sweep and announce the count.
    pub async fn cleanup_expired(&self) -> Result<u64, TetherError> {
        let count = self.coordinator.cleanup_expired().await?;
        self.bus
            .publish(BusEvent::ExpiredSessionsCleanedUp { count });
        Ok(count)
    }

    /// Spawn the periodic maintenance task driving [`cleanup_expired`].
    pub fn spawn_maintenance(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = Duration::from_secs(manager.config.cleanup_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = manager.cleanup_expired().await {
                            error!(error = %e, "maintenance sweep failed");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    fn require_sync(&self) -> Result<&Arc<SyncService>, TetherError> {
        self.sync
            .as_ref()
            .ok_or_else(|| TetherError::Validation("cross-device sync is disabled".into()))
    }

    async fn enqueue_sync(
        &self,
        session_id: &str,
        origin: &DeviceOrigin,
        kind: SyncEventKind,
        data: Value,
    ) {
        if let Some(sync) = &self.sync {
            sync.queue_sync_event(session_id, &origin.device_id, kind, data, origin.version)
                .await;
        }
    }
}

/// Partial-session snapshot used as the payload of a create event.
fn session_snapshot(session: &Session) -> Value {
    serde_json::json!({
        "user_id": session.user_id,
        "browser_state": session.browser_state,
        "conversation_history": session.conversation_history,
        "preferences": session.preferences,
        "metadata": session.metadata,
        "device_info": session.device_info,
    })
}
