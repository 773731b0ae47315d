use std::time::Duration;

use chrono::{DateTime, Utc};

pub fn time_millis() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_millis()
}

/// Returns the timestamp in milliseconds `ttl` from now.
pub fn expires_after(ttl: Duration) -> i64 {
    time_millis().saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64)
}
