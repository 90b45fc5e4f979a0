// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session CRUD operations.

use chrono::{DateTime, Utc};
use rusqlite::params;
use tether_core::merge;
use tether_core::{Session, SessionPatch, SessionQuery, TetherError};

use super::{fmt_ts, parse_ts};
use crate::database::Database;

const SESSION_COLUMNS: &str = "id, user_id, created_at, last_activity, expires_at, \
     browser_state, conversation_history, preferences, metadata, device_info";

/// Create a new session. Fails if the id already exists.
pub async fn create_session(db: &Database, session: &Session) -> Result<(), TetherError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, created_at, last_activity, expires_at,
                         browser_state, conversation_history, preferences, metadata, device_info)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    session.id,
                    session.user_id,
                    fmt_ts(session.created_at),
                    fmt_ts(session.last_activity),
                    fmt_ts(session.expires_at),
                    to_json(&session.browser_state)?,
                    to_json(&session.conversation_history)?,
                    to_json(&session.preferences)?,
                    to_json(&session.metadata)?,
                    to_json(&session.device_info)?,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<Session>, TetherError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id], row_to_session);
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert or fully replace a session.
pub async fn upsert_session(db: &Database, session: &Session) -> Result<(), TetherError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, created_at, last_activity, expires_at,
                         browser_state, conversation_history, preferences, metadata, device_info)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                     user_id = excluded.user_id,
                     created_at = excluded.created_at,
                     last_activity = excluded.last_activity,
                     expires_at = excluded.expires_at,
                     browser_state = excluded.browser_state,
                     conversation_history = excluded.conversation_history,
                     preferences = excluded.preferences,
                     metadata = excluded.metadata,
                     device_info = excluded.device_info",
                params![
                    session.id,
                    session.user_id,
                    fmt_ts(session.created_at),
                    fmt_ts(session.last_activity),
                    fmt_ts(session.expires_at),
                    to_json(&session.browser_state)?,
                    to_json(&session.conversation_history)?,
                    to_json(&session.preferences)?,
                    to_json(&session.metadata)?,
                    to_json(&session.device_info)?,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a partial update inside a transaction and return the merged session,
/// or `None` when the session does not exist. `last_activity` advances to `now`.
pub async fn update_session(
    db: &Database,
    id: &str,
    patch: &SessionPatch,
    now: DateTime<Utc>,
) -> Result<Option<Session>, TetherError> {
    let id = id.to_string();
    let patch = patch.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let result = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
                ))?;
                stmt.query_row(params![id], row_to_session)
            };

            let mut session = match result {
                Ok(session) => session,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            merge::apply_patch(&mut session, &patch, now);

            tx.execute(
                "UPDATE sessions SET user_id = ?2, last_activity = ?3, expires_at = ?4,
                     browser_state = ?5, conversation_history = ?6, preferences = ?7,
                     metadata = ?8, device_info = ?9
                 WHERE id = ?1",
                params![
                    session.id,
                    session.user_id,
                    fmt_ts(session.last_activity),
                    fmt_ts(session.expires_at),
                    to_json(&session.browser_state)?,
                    to_json(&session.conversation_history)?,
                    to_json(&session.preferences)?,
                    to_json(&session.metadata)?,
                    to_json(&session.device_info)?,
                ],
            )?;
            tx.commit()?;

            Ok(Some(session))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a session by ID. Returns whether a row was removed.
pub async fn delete_session(db: &Database, id: &str) -> Result<bool, TetherError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List a user's sessions, most recently active first, with pagination and
/// optional filtering of expired sessions.
pub async fn list_user_sessions(
    db: &Database,
    user_id: &str,
    query: &SessionQuery,
    now: DateTime<Utc>,
) -> Result<Vec<Session>, TetherError> {
    let user_id = user_id.to_string();
    let query = query.clone();
    db.connection()
        .call(move |conn| {
            let mut sessions = Vec::new();
            if query.active_only {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE user_id = ?1 AND expires_at > ?2
                     ORDER BY last_activity DESC LIMIT ?3 OFFSET ?4"
                ))?;
                let rows = stmt.query_map(
                    params![user_id, fmt_ts(now), query.limit as i64, query.offset as i64],
                    row_to_session,
                )?;
                for row in rows {
                    sessions.push(row?);
                }
            } else {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE user_id = ?1
                     ORDER BY last_activity DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt.query_map(
                    params![user_id, query.limit as i64, query.offset as i64],
                    row_to_session,
                )?;
                for row in rows {
                    sessions.push(row?);
                }
            }
            Ok(sessions)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete all sessions whose `expires_at` has passed. Returns the count removed.
pub async fn cleanup_expired(db: &Database, now: DateTime<Utc>) -> Result<u64, TetherError> {
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![fmt_ts(now)],
            )?;
            Ok(removed as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn to_json(value: &serde_json::Value) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(e))
    })
}

/// Convert a row into a `Session`, surfacing malformed columns as
/// conversion failures rather than panicking.
fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let ts = |idx: usize, raw: String| {
        parse_ts(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    };
    let json = |idx: usize, raw: String| {
        serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    };

    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: ts(2, row.get(2)?)?,
        last_activity: ts(3, row.get(3)?)?,
        expires_at: ts(4, row.get(4)?)?,
        browser_state: json(5, row.get(5)?)?,
        conversation_history: json(6, row.get(6)?)?,
        preferences: json(7, row.get(7)?)?,
        metadata: json(8, row.get(8)?)?,
        device_info: json(9, row.get(9)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn t0() -> DateTime<Utc> {
        "2026-06-01T00:00:00Z".parse().unwrap()
    }

    fn make_session(id: &str) -> Session {
        let mut session = Session::new(
            id.to_string(),
            Some("user-1".to_string()),
            t0(),
            chrono::Duration::hours(1),
        );
        session.preferences = json!({"theme": "dark", "language": "en"});
        session
    }

    #[tokio::test]
    async fn create_and_get_session_roundtrips() {
        let (db, _dir) = setup_db().await;
        let session = make_session("sess-1");

        create_session(&db, &session).await.unwrap();
        let retrieved = get_session(&db, "sess-1").await.unwrap().unwrap();
        assert_eq!(retrieved.id, "sess-1");
        assert_eq!(retrieved.user_id, Some("user-1".to_string()));
        assert_eq!(retrieved.created_at, session.created_at);
        assert_eq!(retrieved.preferences, session.preferences);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_nonexistent_session_returns_none() {
        let (db, _dir) = setup_db().await;
        let result = get_session(&db, "no-such-session").await.unwrap();
        assert!(result.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn create_duplicate_id_fails() {
        let (db, _dir) = setup_db().await;
        let session = make_session("dup");
        create_session(&db, &session).await.unwrap();
        let result = create_session(&db, &session).await;
        assert!(result.is_err());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_merges_preferences_and_advances_activity() {
        let (db, _dir) = setup_db().await;
        create_session(&db, &make_session("s-upd")).await.unwrap();

        let patch = SessionPatch {
            preferences: Some(json!({"theme": "light"})),
            ..Default::default()
        };
        let later = t0() + chrono::Duration::seconds(30);
        let updated = update_session(&db, "s-upd", &patch, later)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.preferences["theme"], json!("light"));
        assert_eq!(updated.preferences["language"], json!("en"));
        assert_eq!(updated.last_activity, later);

        // The merged result is what persisted.
        let stored = get_session(&db, "s-upd").await.unwrap().unwrap();
        assert_eq!(stored.preferences, updated.preferences);
        assert_eq!(stored.last_activity, later);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_nonexistent_returns_none() {
        let (db, _dir) = setup_db().await;
        let patch = SessionPatch::default();
        let result = update_session(&db, "ghost", &patch, t0()).await.unwrap();
        assert!(result.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let (db, _dir) = setup_db().await;
        let mut session = make_session("s-ups");
        create_session(&db, &session).await.unwrap();

        session.preferences = json!({"theme": "solarized"});
        session.last_activity = t0() + chrono::Duration::minutes(5);
        upsert_session(&db, &session).await.unwrap();

        let stored = get_session(&db, "s-ups").await.unwrap().unwrap();
        assert_eq!(stored.preferences["theme"], json!("solarized"));
        assert_eq!(stored.last_activity, session.last_activity);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_session_reports_removal() {
        let (db, _dir) = setup_db().await;
        create_session(&db, &make_session("s-del")).await.unwrap();

        assert!(delete_session(&db, "s-del").await.unwrap());
        assert!(!delete_session(&db, "s-del").await.unwrap());
        assert!(get_session(&db, "s-del").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_user_sessions_paginates_and_filters() {
        let (db, _dir) = setup_db().await;

        // Three sessions for user-1, one already expired.
        let mut active_new = make_session("s-new");
        active_new.last_activity = t0() + chrono::Duration::minutes(10);
        upsert_session(&db, &active_new).await.unwrap();

        let active_old = make_session("s-old");
        upsert_session(&db, &active_old).await.unwrap();

        let mut expired = make_session("s-expired");
        expired.expires_at = t0() - chrono::Duration::minutes(1);
        upsert_session(&db, &expired).await.unwrap();

        // Someone else's session.
        let mut other = make_session("s-other");
        other.user_id = Some("user-2".to_string());
        upsert_session(&db, &other).await.unwrap();

        let all = list_user_sessions(&db, "user-1", &SessionQuery::default(), t0())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        // Most recently active first.
        assert_eq!(all[0].id, "s-new");

        let active = list_user_sessions(
            &db,
            "user-1",
            &SessionQuery {
                active_only: true,
                ..Default::default()
            },
            t0(),
        )
        .await
        .unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|s| s.id != "s-expired"));

        let page = list_user_sessions(
            &db,
            "user-1",
            &SessionQuery {
                limit: 1,
                offset: 1,
                active_only: false,
            },
            t0(),
        )
        .await
        .unwrap();
        assert_eq!(page.len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_removes_exactly_expired_sessions() {
        let (db, _dir) = setup_db().await;

        let mut expired = make_session("s-past");
        expired.expires_at = t0() - chrono::Duration::seconds(1);
        upsert_session(&db, &expired).await.unwrap();

        let alive = make_session("s-future");
        upsert_session(&db, &alive).await.unwrap();

        let removed = cleanup_expired(&db, t0()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(get_session(&db, "s-past").await.unwrap().is_none());
        assert!(get_session(&db, "s-future").await.unwrap().is_some());

        db.close().await.unwrap();
    }
}
