// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. All functions accept `&Database` and go through the
//! single writer.

pub mod sessions;

use chrono::{DateTime, SecondsFormat, Utc};

/// Serialize a timestamp the way the schema stores it: RFC 3339 UTC with
/// millisecond precision, fixed width so lexicographic order is temporal
/// order.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp back. Used by row mappers; a malformed column is
/// surfaced as a column conversion failure.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}
