//! Wall-clock helpers.
//!
//! Message envelopes carry Unix milliseconds; client-facing error payloads and
//! payload inner timestamps use ISO-8601 UTC.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time.
#[inline]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC time formatted as ISO-8601 with millisecond precision,
/// e.g. `2024-05-01T12:00:00.123Z`.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
