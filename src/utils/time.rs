//! Time utilities for epoch-second timestamps
//!
//! Cache documents and API responses carry wall-clock time as fractional
//! seconds since the Unix epoch.

use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime};

/// Current wall-clock time in fractional epoch seconds
pub fn now_secs() -> f64 {
    datetime_to_secs(Utc::now())
}

/// Convert a chrono timestamp to fractional epoch seconds
pub fn datetime_to_secs(datetime: DateTime<Utc>) -> f64 {
    datetime.timestamp_micros() as f64 / 1_000_000.0
}

/// Convert a filesystem timestamp to fractional epoch seconds
pub fn system_time_to_secs(time: SystemTime) -> f64 {
    datetime_to_secs(DateTime::<Utc>::from(time))
}

/// Time elapsed since `time`, clamped to zero for timestamps in the future
pub fn elapsed_since(time: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(time)
        .unwrap_or(Duration::ZERO)
}
