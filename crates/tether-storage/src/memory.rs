// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process volatile session store.
//!
//! Used as the best-effort secondary/replica store and in tests. State lives
//! in a `RwLock<HashMap>` and is lost on process exit, which is acceptable
//! for a fallback replica: the primary store remains the source of truth.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use tether_core::merge;
use tether_core::{
    HealthStatus, Session, SessionPatch, SessionQuery, SessionStore, TetherError,
};

/// Volatile `SessionStore` backed by an owned in-memory map.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of sessions currently held. Test/diagnostic helper.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn name(&self) -> &str {
        "memory"
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
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(TetherError::Storage {
                source: format!("session {} already exists", session.id).into(),
            });
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, TetherError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn update(
        &self,
        id: &str,
        patch: &SessionPatch,
    ) -> Result<Option<Session>, TetherError> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return Ok(None);
        };
        merge::apply_patch(session, patch, Utc::now());
        Ok(Some(session.clone()))
    }

    async fn upsert(&self, session: &Session) -> Result<(), TetherError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, TetherError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn get_user_sessions(
        &self,
        user_id: &str,
        query: &SessionQuery,
    ) -> Result<Vec<Session>, TetherError> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        let mut matching: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .filter(|s| !query.active_only || !s.is_expired(now))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn cleanup(&self) -> Result<u64, TetherError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session(id: &str, user: &str) -> Session {
        Session::new(
            id.to_string(),
            Some(user.to_string()),
            Utc::now(),
            chrono::Duration::hours(1),
        )
    }

    #[tokio::test]
    async fn create_get_delete_roundtrip() {
        let store = MemorySessionStore::new();
        store.create(&make_session("s-1", "u-1")).await.unwrap();

        assert!(store.get("s-1").await.unwrap().is_some());
        assert!(store.delete("s-1").await.unwrap());
        assert!(store.get("s-1").await.unwrap().is_none());
        assert!(!store.delete("s-1").await.unwrap());
    }

    #[tokio::test]
    async fn create_duplicate_fails() {
        let store = MemorySessionStore::new();
        store.create(&make_session("s-1", "u-1")).await.unwrap();
        assert!(store.create(&make_session("s-1", "u-1")).await.is_err());
    }

    #[tokio::test]
    async fn update_merges_and_preserves_invariant() {
        let store = MemorySessionStore::new();
        store.create(&make_session("s-1", "u-1")).await.unwrap();

        let patch = SessionPatch {
            preferences: Some(serde_json::json!({"theme": "light"})),
            ..Default::default()
        };
        let updated = store.update("s-1", &patch).await.unwrap().unwrap();
        assert_eq!(updated.preferences["theme"], "light");
        assert!(updated.last_activity >= updated.created_at);
    }

    #[tokio::test]
    async fn update_missing_returns_none() {
        let store = MemorySessionStore::new();
        let result = store
            .update("ghost", &SessionPatch::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn user_listing_sorts_and_paginates() {
        let store = MemorySessionStore::new();
        let mut newer = make_session("s-new", "u-1");
        newer.last_activity = Utc::now() + chrono::Duration::minutes(1);
        store.upsert(&newer).await.unwrap();
        store.upsert(&make_session("s-old", "u-1")).await.unwrap();
        store.upsert(&make_session("s-x", "u-2")).await.unwrap();

        let listed = store
            .get_user_sessions("u-1", &SessionQuery::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "s-new");

        let page = store
            .get_user_sessions(
                "u-1",
                &SessionQuery {
                    limit: 1,
                    offset: 1,
                    active_only: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "s-old");
    }

    #[tokio::test]
    async fn cleanup_removes_expired_only() {
        let store = MemorySessionStore::new();
        let mut expired = make_session("s-expired", "u-1");
        expired.expires_at = Utc::now() - chrono::Duration::minutes(1);
        store.upsert(&expired).await.unwrap();
        store.upsert(&make_session("s-alive", "u-1")).await.unwrap();

        assert_eq!(store.cleanup().await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("s-alive").await.unwrap().is_some());
    }
}
