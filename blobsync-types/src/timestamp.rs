//! Millisecond timestamps.
//!
//! Every time value exchanged with the remote is a Unix timestamp in
//! milliseconds (`i64`). The item codec stores them as ISO-8601 strings with
//! millisecond precision (`2024-06-14T02:31:45.188Z`).

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn unix_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Formats a millisecond timestamp as ISO-8601 (UTC, millisecond precision).
///
/// Zero is the "unset" value and formats as an empty string.
#[must_use]
pub fn format_iso(ms: i64) -> String {
    if ms == 0 {
        return String::new();
    }
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => String::new(),
    }
}

/// Parses an ISO-8601 string back to milliseconds. An empty string is zero.
pub fn parse_iso(s: &str) -> crate::Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| crate::Error::InvalidTimestamp(format!("{s}: {e}")))
}
