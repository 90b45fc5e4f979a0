// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Tether session subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Metadata key set by sync `Delete` events to record deletion intent.
/// Physical deletion is performed by the facade, not the sync layer.
pub const MARKED_FOR_DELETION: &str = "marked_for_deletion";

/// Metadata key holding the RFC 3339 timestamp of the deletion intent.
pub const DELETED_AT: &str = "deleted_at";

/// The durable, per-user (or anonymous) interactive state object this
/// subsystem manages.
///
/// The five sub-documents are owned by upstream product features and treated
/// as opaque blobs here, except during conflict merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique identifier, immutable after creation.
    pub id: String,
    /// Owner reference; `None` for anonymous sessions.
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Advanced on every successful write. Invariant: `last_activity >= created_at`.
    pub last_activity: DateTime<Utc>,
    /// Advisory expiry; a session past this time is logically dead even if
    /// not yet swept.
    pub expires_at: DateTime<Utc>,
    pub browser_state: Value,
    pub conversation_history: Value,
    pub preferences: Value,
    pub metadata: Value,
    pub device_info: Value,
}

impl Session {
    /// Create a fresh session with empty sub-documents and the given lifetime.
    pub fn new(id: String, user_id: Option<String>, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            id,
            user_id,
            created_at: now,
            last_activity: now,
            expires_at: now + ttl,
            browser_state: Value::Object(Default::default()),
            conversation_history: Value::Array(Default::default()),
            preferences: Value::Object(Default::default()),
            metadata: Value::Object(Default::default()),
            device_info: Value::Object(Default::default()),
        }
    }

    /// Whether the session is logically dead at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Advance `last_activity`, clamping so the invariant
    /// `last_activity >= created_at` always holds.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now.max(self.created_at);
    }

    /// Whether a sync `Delete` event has recorded deletion intent.
    pub fn marked_for_deletion(&self) -> bool {
        self.metadata
            .get(MARKED_FOR_DELETION)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// A partial update to a [`Session`]. Every field is optional; `id` is not
/// representable, so backends cannot be asked to change it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPatch {
    pub user_id: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub browser_state: Option<Value>,
    pub conversation_history: Option<Value>,
    pub preferences: Option<Value>,
    pub metadata: Option<Value>,
    pub device_info: Option<Value>,
}

impl SessionPatch {
    /// True when the patch carries no fields at all.
    pub fn is_empty(&self) -> bool {
        self == &SessionPatch::default()
    }
}

/// Pagination and filtering options for listing a user's sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionQuery {
    pub limit: usize,
    pub offset: usize,
    /// Only return sessions whose `expires_at` has not passed.
    pub active_only: bool,
}

impl Default for SessionQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            active_only: false,
        }
    }
}

/// Kind of mutation a sync event records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    Create,
    Update,
    Delete,
}

/// An immutable record of one device's intended mutation to a session.
///
/// Never mutated after creation; retained in a bounded per-session history
/// and swept after the retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: String,
    pub session_id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SyncEventKind,
    /// Partial session payload. Decoded to [`SessionPatch`] at application
    /// time; a payload that fails to decode is a malformed event.
    pub data: Value,
    /// Monotonic per-device counter.
    pub version: u64,
}

impl SyncEvent {
    /// Decode the opaque payload into a typed patch.
    pub fn patch(&self) -> Result<SessionPatch, crate::error::TetherError> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            crate::error::TetherError::Validation(format!(
                "malformed sync event payload for {}: {e}",
                self.id
            ))
        })
    }
}

/// Classification of a detected sync disagreement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ConcurrentUpdate,
    VersionMismatch,
    DeviceConflict,
}

/// A detected disagreement between a session's current state and an incoming
/// event, retained until explicitly resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub session_id: String,
    pub conflict_type: ConflictType,
    /// Session-side version at detection time.
    pub local_version: u64,
    /// Version declared by the conflicting event.
    pub remote_version: u64,
    /// Snapshot of the session state the event disagreed with.
    pub local_data: Value,
    /// The event payload that was not applied.
    pub remote_data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Strategy for resolving a session's conflict ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Discard the remote data entirely.
    AcceptLocal,
    /// Overwrite local fields with the remote data.
    AcceptRemote,
    /// Field-level merge with history dedup and preference union.
    Merge,
}

/// Per-connected-device sync bookkeeping. Not persisted across restarts;
/// devices re-register on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSync {
    pub device_id: String,
    pub device_info: Value,
    pub last_sync_time: DateTime<Utc>,
    /// Highest event version seen from this device.
    pub sync_version: u64,
    /// Events awaiting delivery to this device.
    pub pending_events: Vec<SyncEvent>,
    pub conflict_count: u64,
}

impl DeviceSync {
    pub fn new(device_id: String, device_info: Value, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            device_info,
            last_sync_time: now,
            sync_version: 0,
            pending_events: Vec::new(),
            conflict_count: 0,
        }
    }
}

/// Health status reported by store health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Store is fully operational.
    Healthy,
    /// Store is operational but experiencing issues.
    Degraded(String),
    /// Store is not operational.
    Unhealthy(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn t0() -> DateTime<Utc> {
        "2026-06-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn new_session_satisfies_activity_invariant() {
        let s = Session::new("s-1".into(), Some("u-1".into()), t0(), chrono::Duration::hours(1));
        assert!(s.last_activity >= s.created_at);
        assert_eq!(s.expires_at, t0() + chrono::Duration::hours(1));
        assert!(!s.is_expired(t0()));
        assert!(s.is_expired(t0() + chrono::Duration::hours(2)));
    }

    #[test]
    fn touch_never_moves_before_created_at() {
        let mut s = Session::new("s-1".into(), None, t0(), chrono::Duration::hours(1));
        s.touch(t0() - chrono::Duration::minutes(5));
        assert_eq!(s.last_activity, s.created_at);
        s.touch(t0() + chrono::Duration::minutes(5));
        assert!(s.last_activity > s.created_at);
    }

    #[test]
    fn marked_for_deletion_reads_metadata_flag() {
        let mut s = Session::new("s-1".into(), None, t0(), chrono::Duration::hours(1));
        assert!(!s.marked_for_deletion());
        s.metadata[MARKED_FOR_DELETION] = Value::Bool(true);
        assert!(s.marked_for_deletion());
    }

    #[test]
    fn empty_patch_detection() {
        assert!(SessionPatch::default().is_empty());
        let p = SessionPatch {
            preferences: Some(serde_json::json!({"theme": "dark"})),
            ..Default::default()
        };
        assert!(!p.is_empty());
    }

    #[test]
    fn sync_event_kind_string_roundtrip() {
        for kind in [SyncEventKind::Create, SyncEventKind::Update, SyncEventKind::Delete] {
            let s = kind.to_string();
            assert_eq!(SyncEventKind::from_str(&s).unwrap(), kind);
        }
        assert_eq!(SyncEventKind::Update.to_string(), "update");
    }

    #[test]
    fn conflict_type_serializes_snake_case() {
        let json = serde_json::to_string(&ConflictType::ConcurrentUpdate).unwrap();
        assert_eq!(json, "\"concurrent_update\"");
    }

    #[test]
    fn event_patch_decodes_partial_session() {
        let ev = SyncEvent {
            id: "e-1".into(),
            session_id: "s-1".into(),
            device_id: "d-1".into(),
            timestamp: t0(),
            kind: SyncEventKind::Update,
            data: serde_json::json!({"preferences": {"theme": "light"}}),
            version: 1,
        };
        let patch = ev.patch().unwrap();
        assert_eq!(
            patch.preferences.unwrap()["theme"],
            Value::String("light".into())
        );
    }

    #[test]
    fn event_patch_rejects_malformed_payload() {
        let ev = SyncEvent {
            id: "e-1".into(),
            session_id: "s-1".into(),
            device_id: "d-1".into(),
            timestamp: t0(),
            kind: SyncEventKind::Update,
            data: serde_json::json!({"expires_at": "not-a-timestamp"}),
            version: 1,
        };
        assert!(ev.patch().is_err());
    }
}
