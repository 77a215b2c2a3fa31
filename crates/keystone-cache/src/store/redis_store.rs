//! Redis-backed remote store.

use super::RemoteStore;
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolError, Runtime};
use keystone_core::{CacheError, CacheResult};
use keystone_resilience::with_timeout;
use redis::{AsyncCommands, ErrorKind, RedisError};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Create a Redis connection pool.
///
/// Connections are opened lazily, so an unreachable server does not fail
/// start-up; the first call reports it as a transport error instead.
pub fn create_pool(url: &str, pool_size: usize) -> CacheResult<Pool> {
    info!("Creating Redis connection pool...");

    let pool = Config::from_url(url)
        .builder()
        .map_err(|e| CacheError::configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| CacheError::configuration(format!("Failed to create pool: {}", e)))?;

    info!(pool_size, "Redis connection pool created");
    Ok(pool)
}

/// Redis client with a fixed deadline on every command.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    command_timeout: Duration,
}

impl RedisStore {
    /// Create a new Redis store.
    #[must_use]
    pub fn new(pool: Pool, command_timeout: Duration) -> Self {
        Self {
            pool,
            command_timeout,
        }
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> CacheResult<Connection> {
        self.pool.get().await.map_err(pool_error)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        with_timeout(self.command_timeout, || async {
            let mut conn = self.conn().await?;
            let value: Option<Vec<u8>> = conn.get(key).await.map_err(redis_error)?;

            match &value {
                Some(_) => debug!("Redis hit for key '{}'", key),
                None => debug!("Redis miss for key '{}'", key),
            }
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        with_timeout(self.command_timeout, || async {
            let mut conn = self.conn().await?;
            match ttl {
                Some(ttl) => {
                    let ttl_secs = ttl.as_secs().max(1);
                    conn.set_ex::<_, _, ()>(key, value, ttl_secs)
                        .await
                        .map_err(redis_error)?;
                    debug!("Stored key '{}' with TTL {}s", key, ttl_secs);
                }
                None => {
                    conn.set::<_, _, ()>(key, value).await.map_err(redis_error)?;
                    debug!("Stored key '{}' without TTL", key);
                }
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        with_timeout(self.command_timeout, || async {
            let mut conn = self.conn().await?;
            let removed: u64 = conn.del(key).await.map_err(redis_error)?;
            debug!("Deleted key '{}': {}", key, removed);
            Ok(removed)
        })
        .await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        with_timeout(self.command_timeout, || async {
            let mut conn = self.conn().await?;
            let exists: bool = conn.exists(key).await.map_err(redis_error)?;
            Ok(exists)
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        with_timeout(self.command_timeout, || async {
            let mut conn = self.conn().await?;
            let secs = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
            let applied: bool = conn.expire(key, secs).await.map_err(redis_error)?;
            Ok(applied)
        })
        .await
    }

    async fn ping(&self) -> CacheResult<()> {
        with_timeout(self.command_timeout, || async {
            let mut conn = self.conn().await?;
            let reply = redis::cmd("PING")
                .query_async::<String>(&mut *conn)
                .await
                .map_err(redis_error)?;
            if reply.eq_ignore_ascii_case("PONG") {
                Ok(())
            } else {
                Err(CacheError::data(format!("Unexpected PING reply: {}", reply)))
            }
        })
        .await
    }

    async fn info(&self) -> CacheResult<HashMap<String, String>> {
        with_timeout(self.command_timeout, || async {
            let mut conn = self.conn().await?;
            let raw = redis::cmd("INFO")
                .query_async::<String>(&mut *conn)
                .await
                .map_err(redis_error)?;
            Ok(parse_info(&raw))
        })
        .await
    }
}

/// Parses an `INFO` reply into key/value pairs, skipping section headers.
pub fn parse_info(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Maps a Redis error onto the cache taxonomy.
fn redis_error(err: RedisError) -> CacheError {
    if err.is_timeout() {
        return CacheError::Timeout(err.to_string());
    }
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        return CacheError::transport(err.to_string());
    }
    match err.kind() {
        ErrorKind::BusyLoadingError
        | ErrorKind::TryAgain
        | ErrorKind::ClusterDown
        | ErrorKind::MasterDown
        | ErrorKind::AuthenticationFailed => CacheError::transport(err.to_string()),
        _ => CacheError::data(err.to_string()),
    }
}

fn pool_error(err: PoolError) -> CacheError {
    match err {
        PoolError::Backend(e) => redis_error(e),
        PoolError::Timeout(kind) => CacheError::Timeout(format!("Redis pool timeout: {:?}", kind)),
        other => CacheError::transport(format!("Failed to get Redis connection: {}", other)),
    }
}
