// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed internal event bus for session lifecycle notifications.
//!
//! Logging, metrics, and export collaborators subscribe to a broadcast
//! channel of [`Envelope`]s; publishers never block and never fail the
//! caller. Tests subscribe a receiver and assert on delivered envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default capacity of the broadcast channel. Slow subscribers past this
/// lag are skipped, not waited on.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Lifecycle notifications emitted by the session subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    SessionCreated {
        session_id: String,
        user_id: Option<String>,
    },
    SessionUpdated {
        session_id: String,
    },
    SessionDeleted {
        session_id: String,
    },
    DeviceRegistered {
        device_id: String,
    },
    SyncEventsBroadcast {
        session_id: String,
        target_device_id: String,
        event_count: usize,
    },
    ConflictsResolved {
        session_id: String,
        strategy: String,
        resolved: usize,
    },
    ExpiredSessionsCleanedUp {
        count: u64,
    },
}

impl BusEvent {
    /// Short event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BusEvent::SessionCreated { .. } => "session_created",
            BusEvent::SessionUpdated { .. } => "session_updated",
            BusEvent::SessionDeleted { .. } => "session_deleted",
            BusEvent::DeviceRegistered { .. } => "device_registered",
            BusEvent::SyncEventsBroadcast { .. } => "sync_events_broadcast",
            BusEvent::ConflictsResolved { .. } => "conflicts_resolved",
            BusEvent::ExpiredSessionsCleanedUp { .. } => "expired_sessions_cleaned_up",
        }
    }
}

/// A published notification with identity and emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub at: DateTime<Utc>,
    pub event: BusEvent,
}

/// Broadcast bus handle. Cheap to clone; all clones publish into the same
/// channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all subsequently published events.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Publish an event. Never blocks; a send with zero subscribers is a
    /// no-op, logged at trace level.
    pub fn publish(&self, event: BusEvent) {
        let name = event.name();
        let envelope = Envelope {
            id: uuid::Uuid::new_v4().to_string(),
            at: Utc::now(),
            event,
        };
        match self.tx.send(envelope) {
            Ok(receivers) => {
                debug!(event = name, receivers, "bus event published");
            }
            Err(broadcast::error::SendError(_)) => {
                trace!(event = name, "bus event dropped (no subscribers)");
            }
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(BusEvent::SessionCreated {
            session_id: "s-1".into(),
            user_id: Some("u-1".into()),
        });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(
            envelope.event,
            BusEvent::SessionCreated {
                session_id: "s-1".into(),
                user_id: Some("u-1".into()),
            }
        );
        assert!(!envelope.id.is_empty());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::default();
        // Must not panic or block.
        bus.publish(BusEvent::SessionDeleted {
            session_id: "s-1".into(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let bus = EventBus::default();
        let bus2 = bus.clone();
        let mut rx = bus.subscribe();

        bus2.publish(BusEvent::ExpiredSessionsCleanedUp { count: 3 });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.name(), "expired_sessions_cleaned_up");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_value(BusEvent::DeviceRegistered {
            device_id: "d-1".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "device_registered");
        assert_eq!(json["device_id"], "d-1");
    }
}
