use hv_utils::{digest::sha256_fields, string::normalize, time::epoch_millis};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

use super::outcome::TaskResult;

/// Normalized key of a lookup.
///
/// A pure function of the trimmed, lower-cased query and location plus the
/// limit, so answers for different page sizes never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(query: &str, location: &str, limit: u32) -> Self {
        Self(sha256_fields([
            normalize(query),
            normalize(location),
            limit.to_string(),
        ]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached successful result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub result: TaskResult,
    /// Unix epoch milliseconds.
    pub inserted_at: u64,
    #[serde(rename = "ttl_ms", with = "hv_utils::serde::duration_millis")]
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(fingerprint: Fingerprint, result: TaskResult, ttl: Duration) -> Self {
        Self {
            fingerprint,
            result,
            inserted_at: epoch_millis(),
            ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_pure() {
        assert_eq!(
            Fingerprint::new("pizza", "Boston", 10),
            Fingerprint::new("pizza", "Boston", 10)
        );
    }

    #[test]
    fn test_fingerprint_normalizes_text() {
        assert_eq!(
            Fingerprint::new("  Pizza ", "BOSTON", 10),
            Fingerprint::new("pizza", "boston", 10)
        );
    }

    #[test]
    fn test_limit_changes_fingerprint() {
        assert_ne!(
            Fingerprint::new("pizza", "boston", 10),
            Fingerprint::new("pizza", "boston", 11)
        );
    }

    #[test]
    fn test_fields_do_not_bleed() {
        assert_ne!(
            Fingerprint::new("pizza", "boston", 10),
            Fingerprint::new("boston", "pizza", 10)
        );
    }

    #[test]
    fn test_separator_inside_a_field_does_not_collide() {
        assert_ne!(
            Fingerprint::new("pizza:hut", "boston", 10),
            Fingerprint::new("pizza", "hut:boston", 10)
        );
        assert_ne!(
            Fingerprint::new("pizza", "boston:1", 0),
            Fingerprint::new("pizza", "boston", 10)
        );
    }

    #[test]
    fn test_fingerprint_hashes_normalized_fields() {
        assert_eq!(
            Fingerprint::new(" Pizza", "Boston ", 10).as_str(),
            sha256_fields(["pizza", "boston", "10"])
        );
    }

    #[test]
    fn test_sub_second_ttl_survives_the_wire() {
        let entry = CacheEntry::new(
            Fingerprint::new("pizza", "boston", 10),
            TaskResult::timeout("task:1".into(), Duration::from_millis(5)),
            Duration::from_millis(750),
        );

        let text = serde_json::to_string(&entry).unwrap();
        let back: CacheEntry = serde_json::from_str(&text).unwrap();

        assert_eq!(back.ttl, Duration::from_millis(750));
        assert_eq!(back, entry);
    }
}
