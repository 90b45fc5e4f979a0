// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field-level merge engine for session sub-documents.
//!
//! Merge behavior is driven by an explicit per-field strategy table rather
//! than ad hoc conditionals, so the semantics stay auditable and testable in
//! isolation. Arrays are always replaced wholesale (never concatenated) to
//! avoid unbounded growth; the one exception is [`merge_history`], which is
//! only used by the `Merge` conflict-resolution strategy.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::types::{Session, SessionPatch};

/// How an incoming value combines with the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStrategy {
    /// Incoming value replaces the existing one wholesale.
    Replace,
    /// Objects are merged key-by-key, recursively; arrays and scalars replace.
    Deep,
}

/// The session sub-documents the merge engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionField {
    BrowserState,
    ConversationHistory,
    Preferences,
    Metadata,
    DeviceInfo,
}

/// The per-field strategy table. `browser_state` and `preferences` carry
/// nested feature-owned structure and merge deeply; the rest replace.
pub fn strategy_for(field: SessionField) -> FieldStrategy {
    match field {
        SessionField::BrowserState | SessionField::Preferences => FieldStrategy::Deep,
        SessionField::ConversationHistory
        | SessionField::Metadata
        | SessionField::DeviceInfo => FieldStrategy::Replace,
    }
}

/// Merge `incoming` into `base` per the given strategy.
pub fn merge_value(base: &mut Value, incoming: &Value, strategy: FieldStrategy) {
    match strategy {
        FieldStrategy::Replace => *base = incoming.clone(),
        FieldStrategy::Deep => deep_merge(base, incoming),
    }
}

/// Recursive object merge: keys present in `incoming` override or descend
/// into `base`; arrays and scalars replace wholesale.
pub fn deep_merge(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (key, incoming_val) in incoming_map {
                match base_map.get_mut(key) {
                    Some(base_val) => deep_merge(base_val, incoming_val),
                    None => {
                        base_map.insert(key.clone(), incoming_val.clone());
                    }
                }
            }
        }
        (base, incoming) => *base = incoming.clone(),
    }
}

/// Apply a partial update to a session and advance `last_activity` to `now`.
///
/// Field-level replacement with the strategy table's special cases; the
/// `last_activity >= created_at` invariant is preserved via [`Session::touch`].
pub fn apply_patch(session: &mut Session, patch: &SessionPatch, now: DateTime<Utc>) {
    if let Some(user_id) = &patch.user_id {
        session.user_id = Some(user_id.clone());
    }
    if let Some(expires_at) = patch.expires_at {
        session.expires_at = expires_at;
    }
    if let Some(browser_state) = &patch.browser_state {
        merge_value(
            &mut session.browser_state,
            browser_state,
            strategy_for(SessionField::BrowserState),
        );
    }
    if let Some(history) = &patch.conversation_history {
        merge_value(
            &mut session.conversation_history,
            history,
            strategy_for(SessionField::ConversationHistory),
        );
    }
    if let Some(preferences) = &patch.preferences {
        merge_value(
            &mut session.preferences,
            preferences,
            strategy_for(SessionField::Preferences),
        );
    }
    if let Some(metadata) = &patch.metadata {
        merge_value(
            &mut session.metadata,
            metadata,
            strategy_for(SessionField::Metadata),
        );
    }
    if let Some(device_info) = &patch.device_info {
        merge_value(
            &mut session.device_info,
            device_info,
            strategy_for(SessionField::DeviceInfo),
        );
    }
    session.touch(patch.last_activity.unwrap_or(now));
}

/// Union two conversation histories by item `id`, re-sorted by item
/// `timestamp` ascending. Remote items win on id collision. Items without an
/// `id` are kept as-is from the local side.
///
/// Only used by the `Merge` conflict-resolution strategy; ordinary updates
/// replace the history wholesale.
pub fn merge_history(local: &Value, remote: &Value) -> Value {
    let local_items = local.as_array().cloned().unwrap_or_default();
    let remote_items = remote.as_array().cloned().unwrap_or_default();

    let mut by_id: Map<String, Value> = Map::new();
    let mut without_id: Vec<Value> = Vec::new();

    for item in local_items.iter().chain(remote_items.iter()) {
        match item.get("id").and_then(Value::as_str) {
            Some(id) => {
                // Later (remote) entries override earlier (local) ones.
                by_id.insert(id.to_string(), item.clone());
            }
            None => without_id.push(item.clone()),
        }
    }

    let mut merged: Vec<Value> = by_id.into_iter().map(|(_, v)| v).collect();
    merged.extend(without_id);
    merged.sort_by_key(item_timestamp);
    Value::Array(merged)
}

fn item_timestamp(item: &Value) -> DateTime<Utc> {
    item.get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        "2026-06-01T00:00:00Z".parse().unwrap()
    }

    fn base_session() -> Session {
        let mut s = Session::new("s-1".into(), Some("u-1".into()), t0(), chrono::Duration::hours(1));
        s.preferences = json!({"theme": "dark", "language": "en"});
        s.browser_state = json!({"tabs": [{"url": "https://a.example"}], "zoom": 1.0});
        s
    }

    #[test]
    fn strategy_table_matches_design() {
        assert_eq!(strategy_for(SessionField::BrowserState), FieldStrategy::Deep);
        assert_eq!(strategy_for(SessionField::Preferences), FieldStrategy::Deep);
        assert_eq!(
            strategy_for(SessionField::ConversationHistory),
            FieldStrategy::Replace
        );
        assert_eq!(strategy_for(SessionField::Metadata), FieldStrategy::Replace);
        assert_eq!(strategy_for(SessionField::DeviceInfo), FieldStrategy::Replace);
    }

    #[test]
    fn deep_merge_preserves_sibling_keys() {
        let mut base = json!({"theme": "dark", "language": "en"});
        deep_merge(&mut base, &json!({"theme": "light"}));
        assert_eq!(base, json!({"theme": "light", "language": "en"}));
    }

    #[test]
    fn deep_merge_descends_nested_objects() {
        let mut base = json!({"editor": {"font": "mono", "size": 12}});
        deep_merge(&mut base, &json!({"editor": {"size": 14}}));
        assert_eq!(base, json!({"editor": {"font": "mono", "size": 14}}));
    }

    #[test]
    fn deep_merge_replaces_arrays_wholesale() {
        let mut base = json!({"tabs": [1, 2, 3]});
        deep_merge(&mut base, &json!({"tabs": [4]}));
        assert_eq!(base, json!({"tabs": [4]}));
    }

    #[test]
    fn apply_patch_merges_preferences_and_touches() {
        let mut s = base_session();
        let patch = SessionPatch {
            preferences: Some(json!({"theme": "light"})),
            ..Default::default()
        };
        let later = t0() + chrono::Duration::seconds(10);
        apply_patch(&mut s, &patch, later);

        assert_eq!(s.preferences["theme"], json!("light"));
        assert_eq!(s.preferences["language"], json!("en"));
        assert_eq!(s.last_activity, later);
        assert!(s.last_activity >= s.created_at);
    }

    #[test]
    fn apply_patch_replaces_history_wholesale() {
        let mut s = base_session();
        s.conversation_history = json!([{"id": "m1"}, {"id": "m2"}]);
        let patch = SessionPatch {
            conversation_history: Some(json!([{"id": "m3"}])),
            ..Default::default()
        };
        apply_patch(&mut s, &patch, t0());
        assert_eq!(s.conversation_history, json!([{"id": "m3"}]));
    }

    #[test]
    fn apply_patch_cannot_violate_activity_invariant() {
        let mut s = base_session();
        let patch = SessionPatch {
            last_activity: Some(t0() - chrono::Duration::hours(1)),
            ..Default::default()
        };
        apply_patch(&mut s, &patch, t0());
        assert!(s.last_activity >= s.created_at);
    }

    #[test]
    fn merge_history_dedups_by_id_sorted_by_timestamp() {
        let local = json!([
            {"id": "m1", "timestamp": "2026-06-01T00:00:01Z", "text": "hello"},
            {"id": "m2", "timestamp": "2026-06-01T00:00:03Z", "text": "old"},
        ]);
        let remote = json!([
            {"id": "m2", "timestamp": "2026-06-01T00:00:03Z", "text": "new"},
            {"id": "m3", "timestamp": "2026-06-01T00:00:02Z", "text": "mid"},
        ]);

        let merged = merge_history(&local, &remote);
        let items = merged.as_array().unwrap();
        assert_eq!(items.len(), 3);
        let ids: Vec<&str> = items
            .iter()
            .map(|i| i["id"].as_str().unwrap())
            .collect();
        // Sorted by timestamp ascending; m2 appears exactly once, remote wins.
        assert_eq!(ids, vec!["m1", "m3", "m2"]);
        assert_eq!(items[2]["text"], json!("new"));
    }

    #[test]
    fn merge_history_tolerates_non_array_inputs() {
        let merged = merge_history(&json!(null), &json!([{"id": "m1"}]));
        assert_eq!(merged.as_array().unwrap().len(), 1);
    }
}
