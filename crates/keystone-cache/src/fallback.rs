//! In-process fallback cache.
//!
//! Holds the last value seen for every key read from or written to the
//! remote store, so reads can still be answered while the store is
//! unavailable. Entries never expire on their own; they are replaced by a
//! later write, removed by a delete, or dropped by [`FallbackCache::clear`].
//! Growth is therefore unbounded.

use crate::metrics::CacheMetrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// A cached value with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Entry key.
    pub key: String,
    /// Opaque value.
    pub value: Vec<u8>,
    /// When the entry was stored.
    pub stored_at: DateTime<Utc>,
    /// TTL requested by the writer. Informational only.
    pub ttl: Option<Duration>,
}

/// Size and key listing of the fallback cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FallbackStats {
    /// Number of entries.
    pub size: usize,
    /// All keys, sorted.
    pub keys: BTreeSet<String>,
}

/// Mutex-guarded map of fallback entries.
///
/// The lock is only ever held for the map operation itself.
#[derive(Debug, Default)]
pub struct FallbackCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl FallbackCache {
    /// Creates an empty fallback cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let value = self.entries.lock().get(key).map(|e| e.value.clone());
        CacheMetrics::fallback_lookup(value.is_some());
        value
    }

    /// Returns the full entry for `key`, if present.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    /// Stores or replaces the value for `key`.
    pub fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        let entry = CacheEntry {
            key: key.to_string(),
            value: value.to_vec(),
            stored_at: Utc::now(),
            ttl,
        };
        let size = {
            let mut entries = self.entries.lock();
            entries.insert(key.to_string(), entry);
            entries.len()
        };
        CacheMetrics::fallback_size(size);
    }

    /// Removes `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        let (removed, size) = {
            let mut entries = self.entries.lock();
            let removed = entries.remove(key).is_some();
            (removed, entries.len())
        };
        CacheMetrics::fallback_size(size);
        removed
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// All keys currently held.
    pub fn keys(&self) -> BTreeSet<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Size and keys, read under one lock.
    pub fn stats(&self) -> FallbackStats {
        let entries = self.entries.lock();
        FallbackStats {
            size: entries.len(),
            keys: entries.keys().cloned().collect(),
        }
    }

    /// Removes every entry. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut entries = self.entries.lock();
            let dropped = entries.len();
            entries.clear();
            dropped
        };
        CacheMetrics::fallback_size(0);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_put_get_replace() {
        let cache = FallbackCache::new();
        assert_eq!(cache.get("k"), None);

        cache.put("k", b"one", None);
        assert_eq!(cache.get("k"), Some(b"one".to_vec()));

        cache.put("k", b"two", Some(Duration::from_secs(60)));
        assert_eq!(cache.get("k"), Some(b"two".to_vec()));
        assert_eq!(cache.size(), 1);

        let entry = cache.entry("k").unwrap();
        assert_eq!(entry.ttl, Some(Duration::from_secs(60)));
        assert!(entry.stored_at <= Utc::now());
    }

    #[test]
    fn test_entries_ignore_ttl() {
        let cache = FallbackCache::new();
        cache.put("k", b"v", Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get("k"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = FallbackCache::new();
        cache.put("a", b"1", None);
        cache.put("b", b"2", None);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.keys(), BTreeSet::from(["b".to_string()]));

        assert_eq!(cache.clear(), 1);
        assert_eq!(cache.stats(), FallbackStats::default());
    }

    #[test]
    fn test_concurrent_writers() {
        let cache = Arc::new(FallbackCache::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.put(&format!("{}:{}", t, i), b"v", None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.size(), 800);
        assert_eq!(cache.stats().keys.len(), 800);
    }
}
