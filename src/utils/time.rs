use std::time::Duration;

use chrono::{DateTime, Utc};

/// Current UTC time in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current UTC time in seconds.
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Age of a ledger timestamp (unix seconds) relative to `now_ms`.
///
/// Saturates at zero when the local clock is behind the chain.
pub fn age_at(timestamp: i64, now_ms: i64) -> Duration {
    let diff = now_ms.saturating_sub(timestamp.saturating_mul(1000));
    Duration::from_millis(diff.max(0) as u64)
}

/// Age of a ledger timestamp relative to the wall clock.
pub fn age(timestamp: i64) -> Duration {
    age_at(timestamp, current_timestamp_ms())
}

/// Human readable duration truncated to whole seconds, e.g. `1h 02m 05s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

pub fn timestamp_to_string(timestamp: i64) -> String {
    let datetime = DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
    datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
