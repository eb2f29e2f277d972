//! Epoch-time helpers.
//!
//! Credential expiry arithmetic works in epoch milliseconds so it can be
//! compared and jittered without timezone concerns; the rest of the system
//! uses [`chrono`] types. These helpers bridge the two.

use chrono::{DateTime, TimeZone, Utc};

/// Returns the current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts a UTC datetime to epoch milliseconds.
pub fn to_epoch_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Converts epoch milliseconds back to a UTC datetime.
///
/// Returns `None` for values outside the range chrono can represent.
pub fn from_epoch_ms(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
