use std::{collections::HashMap, future::Future, hash::Hash, sync::Arc, time::Duration};

use tokio::{sync::RwLock, time::Instant};
use tracing::debug;

use crate::error::Result;

/// One cached payload and when it was fetched.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    payload: V,
    fetched_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Served iff `now - fetched_at < ttl`.
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

/// In-memory read-through cache, one entry per query key.
///
/// Entries are overwritten on refresh, never appended, and live only as long
/// as the process. The cache does no work between reads: expiry is checked
/// lazily and `clear` is the only invalidation.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across handlers.
/// The lock is never held while a fetch is in flight.
pub struct RefreshCache<K, V> {
    inner: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
}

impl<K, V> Clone for RefreshCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for RefreshCache<K, V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, V> RefreshCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the payload for `key` if it is still within its ttl.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.inner
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.payload.clone())
    }

    /// Overwrite the entry for `key`, stamped with the current time.
    pub async fn insert(&self, key: K, payload: V, ttl: Duration) {
        let entry = CacheEntry {
            payload,
            fetched_at: Instant::now(),
            ttl,
        };
        self.inner.write().await.insert(key, entry);
    }

    /// Serve `key` from the cache, or run `fetch` exactly once and store the
    /// result. A failed fetch stores nothing.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, ttl: Duration, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(payload) = self.get(&key).await {
            debug!(key = ?key, "Cache hit");
            return Ok(payload);
        }

        debug!(key = ?key, "Cache miss, fetching");
        let payload = fetch().await?;
        self.insert(key, payload.clone(), ttl).await;
        Ok(payload)
    }

    /// Drop every entry regardless of age. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut guard = self.inner.write().await;
        let dropped = guard.len();
        guard.clear();
        dropped
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time;

    use super::*;
    use crate::error::DashboardError;

    const TTL: Duration = Duration::from_secs(5);

    /// Fetch closure that counts invocations and returns the call number.
    fn counting(calls: &AtomicUsize) -> impl Future<Output = Result<usize>> + '_ {
        async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
    }

    #[tokio::test]
    async fn empty_cache_returns_nothing() {
        let cache: RefreshCache<&str, i64> = RefreshCache::new();
        assert!(cache.get(&"latest").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn served_from_cache_while_younger_than_ttl() {
        let cache = RefreshCache::new();
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_fetch("latest", TTL, || counting(&calls)).await.unwrap();
        time::advance(Duration::from_millis(4_999)).await;
        let second = cache.get_or_fetch("latest", TTL, || counting(&calls)).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refetched_exactly_once_when_age_reaches_ttl() {
        let cache = RefreshCache::new();
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch("latest", TTL, || counting(&calls)).await.unwrap();
        time::advance(TTL).await;

        let value = cache.get_or_fetch("latest", TTL, || counting(&calls)).await.unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The new entry is fresh again.
        let value = cache.get_or_fetch("latest", TTL, || counting(&calls)).await.unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_never_served_by_get() {
        let cache = RefreshCache::new();
        cache.insert("history", 10, TTL).await;
        assert_eq!(cache.get(&"history").await, Some(10));

        time::advance(TTL + Duration::from_millis(1)).await;
        assert_eq!(cache.get(&"history").await, None);
        // Still stored until overwritten or cleared.
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_forces_fetch_regardless_of_age() {
        let cache = RefreshCache::new();
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch("a", TTL, || counting(&calls)).await.unwrap();
        cache.get_or_fetch("b", TTL, || counting(&calls)).await.unwrap();
        assert_eq!(cache.clear().await, 2);

        cache.get_or_fetch("a", TTL, || counting(&calls)).await.unwrap();
        cache.get_or_fetch("b", TTL, || counting(&calls)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failed_fetch_stores_nothing() {
        let cache: RefreshCache<&str, i64> = RefreshCache::new();

        let err = cache
            .get_or_fetch("latest", TTL, || async {
                Err(DashboardError::transport("connection reset"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Transport(_)));
        assert!(cache.is_empty().await);

        let value = cache.get_or_fetch("latest", TTL, || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache = RefreshCache::new();
        cache.insert(24_u32, "day", TTL).await;
        cache.insert(168_u32, "week", TTL).await;

        assert_eq!(cache.get(&24).await, Some("day"));
        assert_eq!(cache.get(&168).await, Some("week"));
        assert_eq!(cache.get(&1).await, None);
    }

    #[tokio::test]
    async fn insert_overwrites_previous_entry() {
        let cache = RefreshCache::new();
        cache.insert("latest", 1, TTL).await;
        cache.insert("latest", 2, TTL).await;
        assert_eq!(cache.get(&"latest").await, Some(2));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let cache = RefreshCache::new();
        let clone = cache.clone();
        cache.insert("latest", 1, TTL).await;
        assert_eq!(clone.get(&"latest").await, Some(1));
    }
}
