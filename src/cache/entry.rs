//! Cache document stored per fingerprint

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::time::now_secs;

/// Confidence assumed for results that do not report one
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

/// One analysis result as persisted on disk and held in memory.
///
/// The serialized form is `{result, timestamp, cache_key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Opaque payload returned by the backend
    pub result: Value,
    /// Creation time in epoch seconds
    pub timestamp: f64,
    /// Fingerprint of the analysed image
    pub cache_key: String,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(cache_key: impl Into<String>, result: Value) -> Self {
        Self {
            result,
            timestamp: now_secs(),
            cache_key: cache_key.into(),
        }
    }

    /// Age in seconds relative to `now`, never negative
    pub fn age_secs(&self, now: f64) -> f64 {
        (now - self.timestamp).max(0.0)
    }

    /// An entry is valid while its age is strictly below `max_age`
    pub fn is_expired_at(&self, max_age: u64, now: f64) -> bool {
        self.age_secs(now) >= max_age as f64
    }

    pub fn is_expired(&self, max_age: u64) -> bool {
        self.is_expired_at(max_age, now_secs())
    }

    /// The `confidence` field of the result, or [`DEFAULT_CONFIDENCE`]
    pub fn confidence(&self) -> f64 {
        self.result
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_CONFIDENCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expiry_boundary() {
        let mut entry = CacheEntry::new("k", json!({}));
        let now = entry.timestamp;
        assert!(!entry.is_expired_at(60, now + 59.0));
        assert!(entry.is_expired_at(60, now + 60.0));

        entry.timestamp = now - 60.0 - 1.0;
        assert!(entry.is_expired_at(60, now));
    }

    #[test]
    fn test_zero_max_age_always_expired() {
        let entry = CacheEntry::new("k", json!({}));
        assert!(entry.is_expired_at(0, entry.timestamp));
    }

    #[test]
    fn test_confidence_extraction() {
        assert_eq!(CacheEntry::new("k", json!({"confidence": 0.3})).confidence(), 0.3);
        assert_eq!(CacheEntry::new("k", json!({"confidence": 1})).confidence(), 1.0);
        assert_eq!(
            CacheEntry::new("k", json!({"name": "cat"})).confidence(),
            DEFAULT_CONFIDENCE
        );
        assert_eq!(
            CacheEntry::new("k", json!({"confidence": "high"})).confidence(),
            DEFAULT_CONFIDENCE
        );
    }

    #[test]
    fn test_serialized_shape() {
        let entry = CacheEntry {
            result: json!({"name": "cat"}),
            timestamp: 1.5,
            cache_key: "abc".to_string(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({"result": {"name": "cat"}, "timestamp": 1.5, "cache_key": "abc"})
        );
    }
}
