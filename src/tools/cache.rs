//! Peripheral tool-response cache.
//!
//! Read-only lookups (places, property listings) are cheap to reuse within a
//! call, so their payloads are kept in an in-memory TTL cache keyed by a
//! hash of the tool name plus its canonical argument serialization. Write
//! style dispatches are never cached.

use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

/// Default entry lifetime when the configuration does not set one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1800);

/// TTL cache over tool result payloads. Constructed disabled when no TTL is
/// configured, in which case every lookup misses.
pub struct ToolCache {
    inner: Option<Cache<u64, Value>>,
}

impl ToolCache {
    /// Build a cache with the given entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Some(
                Cache::builder()
                    .max_capacity(4096)
                    .time_to_live(ttl)
                    .build(),
            ),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Build from an optional TTL-in-seconds setting; `None` disables caching.
    pub fn from_ttl_seconds(ttl_seconds: Option<u64>) -> Self {
        match ttl_seconds {
            Some(secs) if secs > 0 => Self::new(Duration::from_secs(secs)),
            _ => Self::disabled(),
        }
    }

    /// Stable key for one (tool, arguments) pair. Arguments are hashed from
    /// their canonical serialization, so key order differences in the raw
    /// argument string do not fragment the cache.
    fn key(tool: &str, arguments: &Value) -> u64 {
        xxh3_64(format!("{tool}:{arguments}").as_bytes())
    }

    pub async fn get(&self, tool: &str, arguments: &Value) -> Option<Value> {
        let cache = self.inner.as_ref()?;
        cache.get(&Self::key(tool, arguments)).await
    }

    pub async fn insert(&self, tool: &str, arguments: &Value, payload: Value) {
        if let Some(cache) = &self.inner {
            cache.insert(Self::key(tool, arguments), payload).await;
        }
    }
}
