//! TTL key-value cache contract, namespaced keys, and the failure-absorbing
//! gateway both engines go through.
//!
//! The cache store is an external collaborator with three operations: get,
//! set-with-TTL, and best-effort invalidation by key prefix. Values are
//! opaque structured payloads; there is no partial update and no cross-key
//! transaction. Prefix invalidation requires the backend to enumerate keys;
//! where it cannot, invalidation degrades to a no-op rather than failing the
//! caller; that trade-off is accepted and exercised in tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::id::UploadId;

/// TTL for per-upload ingestion progress entries.
pub const PROGRESS_TTL: Duration = Duration::from_secs(300);

/// TTL for the cached per-upload column schema.
pub const COLUMNS_TTL: Duration = Duration::from_secs(3600);

/// TTL for cached filtered row counts.
pub const COUNT_TTL: Duration = Duration::from_secs(600);

/// TTL for cached query response envelopes.
pub const PAGE_TTL: Duration = Duration::from_secs(300);

/// Namespaced cache keys.
///
/// Every logical use gets its own prefix so unrelated invalidations cannot
/// collide. Count and page keys additionally carry a fingerprint of the
/// query parameters that shaped the entry.
pub mod keys {
    use super::UploadId;

    /// Key for an upload's live ingestion progress percentage.
    #[must_use]
    pub fn progress(upload_id: UploadId) -> String {
        format!("silo:progress:{upload_id}")
    }

    /// Key for an upload's resolved column schema.
    #[must_use]
    pub fn columns(upload_id: UploadId) -> String {
        format!("silo:columns:{upload_id}")
    }

    /// Key for a filtered row count of an upload.
    #[must_use]
    pub fn count(upload_id: UploadId, fingerprint: &str) -> String {
        format!("silo:count:{upload_id}:{fingerprint}")
    }

    /// Key for a full response envelope of an upload query.
    #[must_use]
    pub fn page(upload_id: UploadId, fingerprint: &str) -> String {
        format!("silo:page:{upload_id}:{fingerprint}")
    }

    /// Every namespace prefix scoped to one upload, for bulk invalidation.
    #[must_use]
    pub fn upload_namespaces(upload_id: UploadId) -> [String; 4] {
        [
            format!("silo:progress:{upload_id}"),
            format!("silo:columns:{upload_id}"),
            format!("silo:count:{upload_id}"),
            format!("silo:page:{upload_id}"),
        ]
    }
}

/// Abstract interface to the TTL key-value cache.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Reads a value. Returns `None` on miss or expiry.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Writes a value with a time-to-live.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Deletes every key starting with `prefix`, returning how many were
    /// removed.
    ///
    /// Backends without key enumeration should return an error; callers
    /// going through [`CacheGateway`] treat that as a no-op.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;
}

/// In-memory TTL cache for testing.
///
/// Expired entries are dropped lazily on read. Not suitable for production.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Converts a lock poison error to a cache error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::cache("lock poisoned")
}

impl MemoryCache {
    /// Creates a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live (unexpired) entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn live_entries(&self) -> Result<usize> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(poison_err)?;
        let count = entries.values().filter(|e| e.expires_at > now).count();
        drop(entries);
        Ok(count)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        let expired = {
            let entries = self.entries.read().map_err(poison_err)?;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write().map_err(poison_err)?;
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        drop(entries);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = (before - entries.len()) as u64;
        drop(entries);
        Ok(removed)
    }
}

/// Failure-absorbing front for the cache store.
///
/// The cache is never load-bearing: every read failure becomes a miss,
/// every write failure is dropped, and invalidation is best-effort. Failures
/// are logged at `warn` (reads/writes) or `debug` (invalidation) and never
/// propagate to callers.
#[derive(Debug, Clone)]
pub struct CacheGateway<C> {
    store: C,
}

impl<C: CacheStore> CacheGateway<C> {
    /// Wraps a cache store.
    #[must_use]
    pub const fn new(store: C) -> Self {
        Self { store }
    }

    /// Reads a value, treating any backend failure as a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Writes a value, dropping any backend failure.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        if let Err(err) = self.store.set(key, value, ttl).await {
            tracing::warn!(key, error = %err, "cache write failed, skipping");
        }
    }

    /// Best-effort prefix invalidation.
    ///
    /// A backend that cannot enumerate keys makes this a no-op; partial
    /// staleness is preferred over surfacing an error.
    pub async fn invalidate(&self, prefix: &str) {
        match self.store.delete_prefix(prefix).await {
            Ok(removed) => {
                tracing::debug!(prefix, removed, "cache prefix invalidated");
            }
            Err(err) => {
                tracing::debug!(prefix, error = %err, "cache invalidation unsupported, skipping");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A cache double whose every operation fails, for gateway degradation
    /// tests.
    #[derive(Debug, Default)]
    struct BrokenCache;

    #[async_trait]
    impl CacheStore for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            Err(Error::cache("backend down"))
        }

        async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<()> {
            Err(Error::cache("backend down"))
        }

        async fn delete_prefix(&self, _prefix: &str) -> Result<u64> {
            Err(Error::cache("no key enumeration"))
        }
    }

    #[tokio::test]
    async fn set_get_roundtrip() -> Result<()> {
        let cache = MemoryCache::new();
        cache
            .set("silo:test:a", json!({"n": 1}), Duration::from_secs(60))
            .await?;
        assert_eq!(cache.get("silo:test:a").await?, Some(json!({"n": 1})));
        assert_eq!(cache.get("silo:test:missing").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() -> Result<()> {
        let cache = MemoryCache::new();
        cache
            .set("silo:test:a", json!(1), Duration::from_secs(0))
            .await?;
        assert_eq!(cache.get("silo:test:a").await?, None);
        assert_eq!(cache.live_entries()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn delete_prefix_only_touches_matching_keys() -> Result<()> {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("silo:page:u1:x", json!(1), ttl).await?;
        cache.set("silo:page:u1:y", json!(2), ttl).await?;
        cache.set("silo:count:u1:x", json!(3), ttl).await?;

        let removed = cache.delete_prefix("silo:page:u1").await?;
        assert_eq!(removed, 2);
        assert_eq!(cache.get("silo:count:u1:x").await?, Some(json!(3)));
        Ok(())
    }

    #[tokio::test]
    async fn gateway_degrades_read_failures_to_misses() {
        let gateway = CacheGateway::new(BrokenCache);
        assert_eq!(gateway.get("silo:test:a").await, None);
    }

    #[tokio::test]
    async fn gateway_swallows_write_and_invalidate_failures() {
        // Backends without key enumeration degrade invalidation to a no-op;
        // the caller must never see an error from any cache path.
        let gateway = CacheGateway::new(BrokenCache);
        gateway
            .set("silo:test:a", json!(1), Duration::from_secs(1))
            .await;
        gateway.invalidate("silo:test").await;
    }

    #[test]
    fn key_namespaces_do_not_collide() {
        let upload_id = UploadId::generate();
        let all = [
            keys::progress(upload_id),
            keys::columns(upload_id),
            keys::count(upload_id, "fp"),
            keys::page(upload_id, "fp"),
        ];
        for (i, a) in all.iter().enumerate() {
            for b in all.iter().skip(i + 1) {
                assert!(!a.starts_with(b.as_str()) && !b.starts_with(a.as_str()));
            }
        }
    }
}
