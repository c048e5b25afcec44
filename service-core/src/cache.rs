//! Size-bounded, TTL-expiring memo cache.
//!
//! Instances are owned by whoever constructs them and handed to the services
//! that read through them; there is no process-wide cache. Entries leave the
//! cache when their TTL elapses, when they are explicitly invalidated, or when
//! the cache is full and they are the least recently used entry.

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::hash::Hash;
use std::time::Duration;

/// Concurrent LRU cache with a maximum entry count and a time to live.
#[derive(Clone)]
pub struct BoundedCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    entries: Cache<K, V>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity.max(1) as u64)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { entries }
    }

    /// Fetch a live entry and mark it as recently used.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).await
    }

    pub async fn insert(&self, key: K, value: V) {
        self.entries.insert(key, value).await;
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// Loader errors are returned as-is and nothing is stored.
    pub async fn get_or_try_insert<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }
        let value = load().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.invalidate(key).await;
    }

    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    /// Number of live entries after pending evictions are applied.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<K, V> std::fmt::Debug for BoundedCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}
