//! Cache backends for the request protection chain.
//!
//! Rate counters and audit records live in a shared key-value store with
//! time-to-live semantics. The store is injected as a `Cache` trait object so
//! the chain runs against Redis in production and an in-memory map in tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::time::Instant;

/// Errors that can occur while talking to the cache backend
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid cached value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Key-value store with per-key expiry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Cache: Send + Sync {
    /// Read a value, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value that expires after `ttl_seconds`.
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError>;

    /// Atomically increment the counter at `key` unless it already reached
    /// `limit`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(count))` with the new count; the expiry is reset to `ttl_seconds`
    /// * `Ok(None)` if the stored count is at or above `limit`; nothing is written
    async fn increment_below(
        &self,
        key: &str,
        limit: u64,
        ttl_seconds: u64,
    ) -> Result<Option<u64>, CacheError>;
}

/// Check-and-increment in a single round trip. A missing key reads as zero.
const INCREMENT_BELOW_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return false
end
local count = redis.call('INCR', KEYS[1])
redis.call('EXPIRE', KEYS[1], ARGV[2])
return count
"#;

/// Redis-backed cache
#[derive(Clone)]
pub struct RedisCache {
    /// Multiplexed connection, cheap to clone per call
    conn: ConnectionManager,
    script: redis::Script,
}

impl RedisCache {
    /// Connect to Redis and build a cache over a managed connection
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            script: redis::Script::new(INCREMENT_BELOW_SCRIPT),
        })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds as usize).await?;
        Ok(())
    }

    async fn increment_below(
        &self,
        key: &str,
        limit: u64,
        ttl_seconds: u64,
    ) -> Result<Option<u64>, CacheError> {
        let mut conn = self.conn.clone();
        let count: Option<u64> = self
            .script
            .key(key)
            .arg(limit)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }
}

/// Expired entries are swept on write at most this often
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Stored {
    value: String,
    expires_at: Instant,
}

impl Stored {
    fn new(value: String, ttl_seconds: u64, now: Instant) -> Self {
        Self {
            value,
            expires_at: now + Duration::from_secs(ttl_seconds),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process cache for tests and single-instance deployments
pub struct MemoryCache {
    entries: DashMap<String, Stored>,
    next_sweep: Mutex<Instant>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_sweep: Mutex::new(Instant::now() + SWEEP_INTERVAL),
        }
    }

    /// Keys currently live, in no particular order
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Entries held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries once the sweep interval has passed
    fn sweep_expired(&self, now: Instant) {
        {
            let mut next_sweep = match self.next_sweep.try_lock() {
                Ok(guard) => guard,
                // Another writer is already sweeping
                Err(_) => return,
            };
            if now < *next_sweep {
                return;
            }
            *next_sweep = now + SWEEP_INTERVAL;
        }
        self.entries.retain(|_, stored| stored.is_live(now));
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(stored) if stored.is_live(now) => return Ok(Some(stored.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        self.entries.remove_if(key, |_, stored| !stored.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let now = Instant::now();
        self.sweep_expired(now);
        self.entries.insert(key.to_string(), Stored::new(value.to_string(), ttl_seconds, now));
        Ok(())
    }

    async fn increment_below(
        &self,
        key: &str,
        limit: u64,
        ttl_seconds: u64,
    ) -> Result<Option<u64>, CacheError> {
        let now = Instant::now();
        self.sweep_expired(now);

        // The entry guard holds the shard lock, so check and write are atomic
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = if occupied.get().is_live(now) {
                    let value = &occupied.get().value;
                    value.parse::<u64>().map_err(|_| CacheError::InvalidValue {
                        key: key.to_string(),
                        value: value.clone(),
                    })?
                } else {
                    0
                };

                if current >= limit {
                    return Ok(None);
                }

                let count = current + 1;
                occupied.insert(Stored::new(count.to_string(), ttl_seconds, now));
                Ok(Some(count))
            }
            Entry::Vacant(vacant) => {
                if limit == 0 {
                    return Ok(None);
                }
                vacant.insert(Stored::new("1".to_string(), ttl_seconds, now));
                Ok(Some(1))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_set_expires_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("greeting", "hello", 10).await.unwrap();
        assert_eq!(cache.get("greeting").await.unwrap().as_deref(), Some("hello"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("greeting").await.unwrap(), None);
        assert!(cache.keys().await.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_below_stops_at_limit() {
        let cache = MemoryCache::new();

        assert_eq!(cache.increment_below("counter", 2, 60).await.unwrap(), Some(1));
        assert_eq!(cache.increment_below("counter", 2, 60).await.unwrap(), Some(2));
        assert_eq!(cache.increment_below("counter", 2, 60).await.unwrap(), None);

        // Rejected increments leave the stored count alone
        assert_eq!(cache.get("counter").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_refreshes_expiry() {
        let cache = MemoryCache::new();
        cache.increment_below("counter", 10, 60).await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        cache.increment_below("counter", 10, 60).await.unwrap();

        // 100s after the first write but only 50s after the last one
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.get("counter").await.unwrap().as_deref(), Some("2"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("counter").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_counter_restarts_at_one() {
        let cache = MemoryCache::new();
        for _ in 0..3 {
            cache.increment_below("counter", 3, 60).await.unwrap();
        }
        assert_eq!(cache.increment_below("counter", 3, 60).await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.increment_below("counter", 3, 60).await.unwrap(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_expired_entries() {
        let cache = MemoryCache::new();
        for i in 0..1000 {
            cache
                .set(&format!("suspicious_10.0.0.1_{}", i), "{}", 86_400)
                .await
                .unwrap();
        }
        for i in 0..20 {
            cache
                .increment_below(&format!("rate_limit_10.0.1.{}", i), 10, 3600)
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 1020);

        tokio::time::advance(Duration::from_secs(86_401)).await;
        cache.set("suspicious_10.0.0.2_1", "{}", 86_400).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.keys().await, vec!["suspicious_10.0.0.2_1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_live_entries() {
        let cache = MemoryCache::new();
        cache.set("short", "1", 30).await.unwrap();
        cache.set("long", "1", 600).await.unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;
        cache.increment_below("counter", 10, 60).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("long").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_increment_rejects_non_numeric_value() {
        let cache = MemoryCache::new();
        cache.set("counter", "many", 60).await.unwrap();

        assert!(matches!(
            cache.increment_below("counter", 10, 60).await,
            Err(CacheError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_increments_never_exceed_limit() {
        let cache = Arc::new(MemoryCache::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.increment_below("counter", 10, 60).await.unwrap()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 10);
        assert_eq!(cache.get("counter").await.unwrap().as_deref(), Some("10"));
    }
}
