//! In-process remote store, used when Redis is disabled and in tests.

use super::RemoteStore;
use async_trait::async_trait;
use keystone_core::CacheResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// Deadline `ttl` from `now`. A TTL past what `Instant` can represent never expires.
fn deadline(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// A `HashMap` behind a mutex that honours time-to-live.
///
/// Expired entries are dropped lazily when touched.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|v| v.is_live(now)).count()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(stored) if stored.is_live(now) => Some(stored.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.live(key))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let stored = StoredValue {
            value: value.to_vec(),
            expires_at: ttl.and_then(|ttl| deadline(Instant::now(), ttl)),
        };
        self.entries.lock().insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        let now = Instant::now();
        let removed = self.entries.lock().remove(key);
        Ok(u64::from(removed.is_some_and(|v| v.is_live(now))))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(stored) if stored.is_live(now) => {
                stored.expires_at = deadline(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn info(&self) -> CacheResult<HashMap<String, String>> {
        let entries = self.entries.lock();
        let used: usize = entries.iter().map(|(k, v)| k.len() + v.value.len()).sum();

        let mut info = HashMap::new();
        info.insert("redis_version".to_string(), "in-memory".to_string());
        info.insert("redis_mode".to_string(), "standalone".to_string());
        info.insert("connected_clients".to_string(), "1".to_string());
        info.insert("used_memory".to_string(), used.to_string());
        info.insert("used_memory_human".to_string(), format!("{}B", used));
        info.insert("db0".to_string(), format!("keys={}", entries.len()));
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryStore::new();
        store.set("k", b"v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.exists("k").await.unwrap());
        assert_eq!(store.delete("k").await.unwrap(), 1);
        assert_eq!(store.delete("k").await.unwrap(), 0);
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expires_entries() {
        let store = InMemoryStore::new();
        store
            .set("k", b"v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.exists("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expire_only_applies_to_present_keys() {
        let store = InMemoryStore::new();
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());

        store.set("k", b"v", None).await.unwrap();
        assert!(store.expire("k", Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_unbounded_ttl_never_expires() {
        let store = InMemoryStore::new();
        store.set("k", b"v", Some(Duration::MAX)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        store.set("j", b"v", Some(Duration::from_millis(20))).await.unwrap();
        assert!(store.expire("j", Duration::MAX).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.exists("j").await.unwrap());
    }

    #[tokio::test]
    async fn test_info_reports_version() {
        let store = InMemoryStore::new();
        store.set("a", b"1234", None).await.unwrap();
        let info = store.info().await.unwrap();
        assert_eq!(info["redis_version"], "in-memory");
        assert_eq!(info["used_memory"], "5");
        assert!(store.ping().await.is_ok());
    }
}
