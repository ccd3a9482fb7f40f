//! TTL cache for normalized gateway responses.
//!
//! Backends only persist rows; [`ResponseCache`] decides freshness. Expired rows
//! are ignored on read and overwritten on the next successful fetch, never
//! deleted.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use propdata_store::{Store, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

/// Default time-to-live for cached responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Defines how a single gateway call interacts with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a fresh entry when present; otherwise fetch and write back. (Default)
    #[default]
    Use,
    /// Skip the read, fetch, and write the new response.
    Refresh,
    /// Neither read nor write.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        matches!(self, Self::Use | Self::Refresh)
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cache payload could not be encoded: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("cache task failed: {0}")]
    Task(String),
}

/// A cached row as stored, regardless of age.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub data: Value,
    pub created_at: OffsetDateTime,
}

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Storage for cache rows.
pub trait CacheBackend: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<CachedEntry>>;

    /// Upsert; last write wins.
    fn put<'a>(&'a self, key: &'a str, entry: CachedEntry) -> CacheFuture<'a, ()>;
}

/// Process-local backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheBackend {
    inner: Arc<tokio::sync::RwLock<HashMap<String, CachedEntry>>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<CachedEntry>> {
        Box::pin(async move { Ok(self.inner.read().await.get(key).cloned()) })
    }

    fn put<'a>(&'a self, key: &'a str, entry: CachedEntry) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.inner.write().await.insert(key.to_owned(), entry);
            Ok(())
        })
    }
}

/// `response_cache` table backend.
#[derive(Clone)]
pub struct StoreCacheBackend {
    store: Store,
}

impl StoreCacheBackend {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl CacheBackend for StoreCacheBackend {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<CachedEntry>> {
        Box::pin(async move {
            let store = self.store.clone();
            let key = key.to_owned();
            let row = tokio::task::spawn_blocking(move || store.get_cache_row(&key))
                .await
                .map_err(|error| CacheError::Task(error.to_string()))??;
            Ok(row.map(|row| CachedEntry {
                data: row.data,
                created_at: row.created_at,
            }))
        })
    }

    fn put<'a>(&'a self, key: &'a str, entry: CachedEntry) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let store = self.store.clone();
            let key = key.to_owned();
            tokio::task::spawn_blocking(move || {
                store.upsert_cache_row(&key, &entry.data, entry.created_at)
            })
            .await
            .map_err(|error| CacheError::Task(error.to_string()))??;
            Ok(())
        })
    }
}

/// TTL policy over a [`CacheBackend`]. Failures are logged, never surfaced.
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_disabled(&self) -> bool {
        self.ttl.is_zero()
    }

    /// Whether a row written at `created_at` is still valid at `now`.
    pub fn is_fresh_at(&self, created_at: OffsetDateTime, now: OffsetDateTime) -> bool {
        let age = Duration::try_from(now - created_at).unwrap_or(Duration::ZERO);
        age < self.ttl
    }

    /// Fresh entry for `key`, decoded as `T`.
    pub async fn lookup<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        if self.is_disabled() {
            return None;
        }

        let entry = match self.backend.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(cache_key = key, %error, "cache read failed");
                return None;
            }
        };

        if !self.is_fresh_at(entry.created_at, OffsetDateTime::now_utc()) {
            tracing::debug!(cache_key = key, "cache entry expired");
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(cache_key = key, %error, "cached payload did not decode");
                None
            }
        }
    }

    pub async fn store<T>(&self, key: &str, value: &T)
    where
        T: Serialize,
    {
        if self.is_disabled() {
            return;
        }

        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(error) => {
                tracing::warn!(
                    cache_key = key,
                    error = %CacheError::from(error),
                    "cache write skipped"
                );
                return;
            }
        };

        let entry = CachedEntry {
            data,
            created_at: OffsetDateTime::now_utc(),
        };
        if let Err(error) = self.backend.put(key, entry).await {
            tracing::warn!(cache_key = key, %error, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct FailingBackend;

    impl CacheBackend for FailingBackend {
        fn get<'a>(&'a self, _key: &'a str) -> CacheFuture<'a, Option<CachedEntry>> {
            Box::pin(async { Err(CacheError::Task(String::from("offline"))) })
        }

        fn put<'a>(&'a self, _key: &'a str, _entry: CachedEntry) -> CacheFuture<'a, ()> {
            Box::pin(async { Err(CacheError::Task(String::from("offline"))) })
        }
    }

    #[tokio::test]
    async fn stores_and_reads_fresh_entries() {
        let cache = ResponseCache::in_memory(Duration::from_secs(60));

        assert_eq!(cache.lookup::<Value>("key").await, None);
        cache.store("key", &json!({"success": true})).await;
        assert_eq!(
            cache.lookup::<Value>("key").await,
            Some(json!({"success": true}))
        );
    }

    #[tokio::test]
    async fn expired_entries_are_ignored_but_kept() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = ResponseCache::new(backend.clone(), Duration::from_millis(50));

        cache.store("key", &json!(1)).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(cache.lookup::<Value>("key").await, None);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn overwrite_refreshes_entry() {
        let cache = ResponseCache::in_memory(Duration::from_secs(60));
        cache.store("key", &json!(1)).await;
        cache.store("key", &json!(2)).await;
        assert_eq!(cache.lookup::<Value>("key").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn zero_ttl_disables_cache() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = ResponseCache::new(backend.clone(), Duration::ZERO);

        cache.store("key", &json!(1)).await;
        assert!(backend.is_empty().await);
        assert_eq!(cache.lookup::<Value>("key").await, None);
    }

    #[tokio::test]
    async fn backend_failures_degrade_to_misses() {
        let cache = ResponseCache::new(Arc::new(FailingBackend), Duration::from_secs(60));
        cache.store("key", &json!(1)).await;
        assert_eq!(cache.lookup::<Value>("key").await, None);
    }

    #[tokio::test]
    async fn store_backend_persists_rows() {
        let store = Store::open_in_memory().expect("store opens");
        let cache = ResponseCache::new(
            Arc::new(StoreCacheBackend::new(store.clone())),
            Duration::from_secs(60),
        );

        cache.store("ponsonby-auckland-all-all-12", &json!({"success": true})).await;

        assert_eq!(store.cache_row_count().expect("count"), 1);
        assert_eq!(
            cache.lookup::<Value>("ponsonby-auckland-all-all-12").await,
            Some(json!({"success": true}))
        );
    }

    #[test]
    fn freshness_is_strictly_less_than_ttl() {
        let cache = ResponseCache::in_memory(Duration::from_secs(10));
        let created = OffsetDateTime::now_utc();

        assert!(cache.is_fresh_at(created, created + time::Duration::seconds(9)));
        assert!(!cache.is_fresh_at(created, created + time::Duration::seconds(10)));
        assert!(cache.is_fresh_at(created, created - time::Duration::seconds(5)));
    }

    #[test]
    fn cache_mode_default_reads_and_writes() {
        let mode = CacheMode::default();
        assert!(mode.reads() && mode.writes());
        assert!(!CacheMode::Refresh.reads());
        assert!(!CacheMode::Bypass.writes());
    }
}
