use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp the way the cache stores it: RFC 3339 with an
/// explicit `+00:00` offset and whole-second precision.
///
/// Example: `2023-05-01T14:07:09+00:00`
pub fn format_utc(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Parse an ISO-8601 timestamp, tolerating the upstream API's `Z` suffix.
///
/// Returns `None` when the string is not a valid timestamp.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw.replace('Z', "+00:00"))
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Truncate a string to at most `max` characters, never splitting a char.
///
/// Counts characters rather than bytes so multibyte input cannot panic a
/// byte-index slice.
pub fn truncate_chars(raw: &str, max: usize) -> &str {
    match raw.char_indices().nth(max) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
