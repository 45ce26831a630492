//! Canonical timestamp handling.
//!
//! Every timestamp persisted by ratchet is TEXT, RFC 3339, UTC, second
//! precision (`2026-03-01T09:30:00Z`). One fixed format means lexicographic
//! comparison inside SQL (`lease_until < ?`) is also chronological
//! comparison, which the lease and selection queries rely on.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};

/// Format an instant for storage.
pub fn fmt_ts(at: DateTime<Utc>) -> String {
    floor_secs(at).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp. Returns `None` for malformed text rather than
/// erroring — a corrupt column is treated like an absent one.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Truncate an instant to whole-second granularity, the tick size of the
/// scheduler.
pub fn floor_secs(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_nanosecond(0).unwrap_or(at)
}
