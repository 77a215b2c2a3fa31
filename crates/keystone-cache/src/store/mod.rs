//! Remote key-value store abstraction.
//!
//! The façade only ever talks to a [`RemoteStore`]. The Redis client, the
//! in-process store used when Redis is disabled, and every resilience layer
//! in [`crate::layers`] implement the same trait, so they compose by
//! wrapping.

mod memory;
mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::{create_pool, parse_info, RedisStore};

use async_trait::async_trait;
use keystone_core::CacheResult;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Operations the cache needs from the remote store.
///
/// Values are opaque byte strings. Errors follow the [`keystone_core::CacheError`]
/// taxonomy: broken connections surface as `Transport`, missed deadlines as
/// `Timeout`, and replies of the wrong shape as `Data`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads a value. `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Writes a value, with an optional time-to-live.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Removes a key, returning how many keys were removed.
    async fn delete(&self, key: &str) -> CacheResult<u64>;

    /// Checks whether a key is present.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Sets the time-to-live of an existing key. `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Round-trips a no-op command to verify reachability.
    async fn ping(&self) -> CacheResult<()>;

    /// Returns server information as flat key/value pairs.
    async fn info(&self) -> CacheResult<HashMap<String, String>>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        (**self).exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        (**self).expire(key, ttl).await
    }

    async fn ping(&self) -> CacheResult<()> {
        (**self).ping().await
    }

    async fn info(&self) -> CacheResult<HashMap<String, String>> {
        (**self).info().await
    }
}
