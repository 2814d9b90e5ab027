//! Read-through cache in front of function invocations.
//!
//! The store contract is stale-while-revalidate with two clocks: TTR (time
//! to refresh) marks an entry stale, TTL (time to live) evicts it. A fresh
//! entry is served directly; a stale one is served immediately while a
//! background task refills it; a missing one blocks on the fill.
//!
//! Two implementations: Redis for deployments (value key plus a short-lived
//! freshness marker key) and an in-process map for single-instance use and
//! tests. Store failures never fail a request the backend can serve: every
//! Redis error degrades to a direct fill with a warning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::{Pool, Runtime};
use futures::future::BoxFuture;
use redis::AsyncCommands;
use serde_json::{json, Value};
use tokio::time::timeout;

use fnrelay_common::{GatewayError, Result};

/// Produces the value to cache; called at most once per lookup.
pub type Fill = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value>> + Send>;

/// Key/value cache with TTL, TTR, and imperative refresh/evict operations.
///
/// Entries are scoped by namespace (the request host), so the same key from
/// different origins never collides.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the cached value, refreshing per the stale-while-revalidate
    /// contract; `fill` is invoked to produce the value when needed.
    async fn get(&self, namespace: &str, key: &str, fill: Fill) -> Result<Value>;

    /// Marks entries stale so the next lookup triggers a background refill.
    /// Returns the number of entries marked.
    async fn mark_to_refresh(&self, namespace: &str, keys: &[String]) -> Result<Value>;

    /// Removes entries outright. Returns the number of entries removed.
    async fn unset(&self, namespace: &str, keys: &[String]) -> Result<Value>;
}

/// Tuning knobs passed through from the environment.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entry eviction horizon.
    pub ttl: Duration,
    /// Staleness horizon; stale entries are served while a refill runs.
    pub ttr: Duration,
    /// Budget for each store round trip before falling back to the backend.
    pub timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl: Duration::from_secs(30 * 24 * 3600),
            ttr: Duration::from_secs(7200),
            timeout: Duration::from_millis(1000),
        }
    }
}

/// Redis-backed store.
///
/// Layout per entry: `{namespace}:{key}` holds the JSON value with the TTL
/// as its expiry, and `{namespace}:{key}:fresh` is an empty marker expiring
/// after the TTR. A present value with a missing marker is the stale state.
pub struct RedisCacheStore {
    pool: Pool,
    config: CacheConfig,
}

impl RedisCacheStore {
    pub fn connect(redis_url: &str, config: CacheConfig) -> Result<Self> {
        let pool = deadpool_redis::Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| GatewayError::Config(format!("failed to create redis pool: {}", e)))?;
        Ok(RedisCacheStore { pool, config })
    }

    fn value_key(namespace: &str, key: &str) -> String {
        format!("{}:{}", namespace, key)
    }

    fn fresh_key(namespace: &str, key: &str) -> String {
        format!("{}:{}:fresh", namespace, key)
    }

    async fn read(&self, namespace: &str, key: &str) -> Result<(Option<Value>, bool)> {
        let mut conn = timeout(self.config.timeout, self.pool.get())
            .await
            .map_err(|_| GatewayError::Timeout(self.config.timeout.as_millis() as u64))?
            .map_err(|e| GatewayError::Transport(format!("redis connection failed: {}", e)))?;

        let (raw, fresh): (Option<String>, bool) = timeout(self.config.timeout, async {
            let raw: Option<String> = conn.get(Self::value_key(namespace, key)).await?;
            let fresh: bool = conn.exists(Self::fresh_key(namespace, key)).await?;
            redis::RedisResult::Ok((raw, fresh))
        })
        .await
        .map_err(|_| GatewayError::Timeout(self.config.timeout.as_millis() as u64))?
        .map_err(|e| GatewayError::Transport(format!("redis read failed: {}", e)))?;

        let value = match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        Ok((value, fresh))
    }

    async fn write(pool: &Pool, config: &CacheConfig, namespace: &str, key: &str, value: &Value) {
        let result: redis::RedisResult<()> = async {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| redis::RedisError::from(std::io::Error::other(e.to_string())))?;
            let raw = value.to_string();
            conn.set_ex::<_, _, ()>(
                Self::value_key(namespace, key),
                raw,
                config.ttl.as_secs(),
            )
            .await?;
            conn.set_ex::<_, _, ()>(
                Self::fresh_key(namespace, key),
                1u8,
                config.ttr.as_secs(),
            )
            .await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(namespace = %namespace, key = %key, error = %e, "redis write failed");
        }
    }

    async fn delete(&self, keys: Vec<String>) -> Result<u64> {
        let mut conn = timeout(self.config.timeout, self.pool.get())
            .await
            .map_err(|_| GatewayError::Timeout(self.config.timeout.as_millis() as u64))?
            .map_err(|e| GatewayError::Transport(format!("redis connection failed: {}", e)))?;

        let deleted: u64 = timeout(self.config.timeout, conn.del(keys))
            .await
            .map_err(|_| GatewayError::Timeout(self.config.timeout.as_millis() as u64))?
            .map_err(|e| GatewayError::Transport(format!("redis delete failed: {}", e)))?;
        Ok(deleted)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, namespace: &str, key: &str, fill: Fill) -> Result<Value> {
        let (cached, fresh) = match self.read(namespace, key).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(namespace = %namespace, key = %key, error = %e,
                    "cache read failed, invoking backend directly");
                return fill().await;
            }
        };

        match cached {
            Some(value) if fresh => Ok(value),
            Some(value) => {
                // Stale: serve the cached value, refill in the background.
                let pool = self.pool.clone();
                let config = self.config.clone();
                let namespace = namespace.to_string();
                let key = key.to_string();
                tokio::spawn(async move {
                    match fill().await {
                        Ok(fresh_value) => {
                            Self::write(&pool, &config, &namespace, &key, &fresh_value).await;
                        }
                        Err(e) => {
                            tracing::warn!(namespace = %namespace, key = %key, error = %e,
                                "background cache refresh failed");
                        }
                    }
                });
                Ok(value)
            }
            None => {
                let value = fill().await?;
                Self::write(&self.pool, &self.config, namespace, key, &value).await;
                Ok(value)
            }
        }
    }

    async fn mark_to_refresh(&self, namespace: &str, keys: &[String]) -> Result<Value> {
        let fresh_keys = keys
            .iter()
            .map(|k| Self::fresh_key(namespace, k))
            .collect();
        Ok(json!(self.delete(fresh_keys).await?))
    }

    async fn unset(&self, namespace: &str, keys: &[String]) -> Result<Value> {
        let all_keys = keys
            .iter()
            .flat_map(|k| [Self::value_key(namespace, k), Self::fresh_key(namespace, k)])
            .collect();
        let deleted = self.delete(all_keys).await?;
        // Each entry is a value/marker key pair.
        Ok(json!(deleted / 2))
    }
}

struct MemoryEntry {
    value: Value,
    fresh_until: Instant,
    expires_at: Instant,
}

/// In-process store with the same TTL/TTR semantics, for single-instance
/// deployments and tests.
pub struct MemoryCacheStore {
    entries: Arc<DashMap<String, MemoryEntry>>,
    ttl: Duration,
    ttr: Duration,
}

impl MemoryCacheStore {
    pub fn new(ttl: Duration, ttr: Duration) -> Self {
        MemoryCacheStore { entries: Arc::new(DashMap::new()), ttl, ttr }
    }

    fn entry_key(namespace: &str, key: &str) -> String {
        format!("{}:{}", namespace, key)
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self::new(config.ttl, config.ttr)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, namespace: &str, key: &str, fill: Fill) -> Result<Value> {
        let full_key = Self::entry_key(namespace, key);
        let now = Instant::now();

        if let Some(entry) = self.entries.get(&full_key) {
            if now <= entry.expires_at {
                let value = entry.value.clone();
                let stale = now >= entry.fresh_until;
                drop(entry);
                if stale {
                    let entries = self.entries.clone();
                    let ttl = self.ttl;
                    let ttr = self.ttr;
                    tokio::spawn(async move {
                        match fill().await {
                            Ok(fresh_value) => {
                                let now = Instant::now();
                                entries.insert(
                                    full_key,
                                    MemoryEntry {
                                        value: fresh_value,
                                        fresh_until: now + ttr,
                                        expires_at: now + ttl,
                                    },
                                );
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "background cache refresh failed");
                            }
                        }
                    });
                }
                return Ok(value);
            }
            drop(entry);
            self.entries.remove(&full_key);
        }

        let value = fill().await?;
        self.entries.insert(
            full_key,
            MemoryEntry {
                value: value.clone(),
                fresh_until: now + self.ttr,
                expires_at: now + self.ttl,
            },
        );
        Ok(value)
    }

    async fn mark_to_refresh(&self, namespace: &str, keys: &[String]) -> Result<Value> {
        let now = Instant::now();
        let mut marked = 0u64;
        for key in keys {
            if let Some(mut entry) = self.entries.get_mut(&Self::entry_key(namespace, key)) {
                entry.fresh_until = now;
                marked += 1;
            }
        }
        Ok(json!(marked))
    }

    async fn unset(&self, namespace: &str, keys: &[String]) -> Result<Value> {
        let mut removed = 0u64;
        for key in keys {
            if self.entries.remove(&Self::entry_key(namespace, key)).is_some() {
                removed += 1;
            }
        }
        Ok(json!(removed))
    }
}
