//! Timestamp helpers
//!
//! All timestamps are Unix nanoseconds (i64).

use chrono::Utc;

/// Current wall-clock time in Unix nanos
pub fn unix_nanos_now() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}
