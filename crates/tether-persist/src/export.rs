// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session export serialization. A thin convenience over the read path, not
//! core logic.

use std::str::FromStr;

use tether_core::{Session, TetherError};

/// Wire format for [`crate::PersistenceCoordinator::export_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One pretty-printed JSON array.
    Json,
    /// One JSON object per line.
    JsonLines,
}

impl FromStr for ExportFormat {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "jsonl" | "json-lines" => Ok(ExportFormat::JsonLines),
            other => Err(TetherError::Validation(format!(
                "unknown export format `{other}` (expected json or jsonl)"
            ))),
        }
    }
}

/// Serialize a page of sessions into the requested format.
pub fn serialize_sessions(
    sessions: &[Session],
    format: ExportFormat,
) -> Result<String, TetherError> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(sessions)
            .map_err(|e| TetherError::Internal(format!("export serialization failed: {e}"))),
        ExportFormat::JsonLines => {
            let mut out = String::new();
            for session in sessions {
                let line = serde_json::to_string(session).map_err(|e| {
                    TetherError::Internal(format!("export serialization failed: {e}"))
                })?;
                out.push_str(&line);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_session(id: &str) -> Session {
        Session::new(id.to_string(), None, Utc::now(), chrono::Duration::hours(1))
    }

    #[test]
    fn format_parses_known_names() {
        assert_eq!(ExportFormat::from_str("json").unwrap(), ExportFormat::Json);
        assert_eq!(
            ExportFormat::from_str("jsonl").unwrap(),
            ExportFormat::JsonLines
        );
        assert!(ExportFormat::from_str("xml").is_err());
    }

    #[test]
    fn json_export_roundtrips() {
        let sessions = vec![make_session("s-1"), make_session("s-2")];
        let blob = serialize_sessions(&sessions, ExportFormat::Json).unwrap();
        let parsed: Vec<Session> = serde_json::from_str(&blob).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id, "s-1");
    }

    #[test]
    fn jsonl_export_is_one_object_per_line() {
        let sessions = vec![make_session("s-1"), make_session("s-2")];
        let blob = serialize_sessions(&sessions, ExportFormat::JsonLines).unwrap();
        let lines: Vec<&str> = blob.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Session = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.id, "s-1");
    }
}
