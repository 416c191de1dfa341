//! # In-Memory Cache Store
//!
//! DashMap-backed store. Expired entries are evicted lazily by the read that
//! observes them; there is no background sweep and no size bound.

use super::{CacheEntry, CacheStore, Freshness, ReadOutcome};
use crate::caching::invalidation::KeyMatcher;
use crate::caching::key_generator::CacheKey;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// In-memory cache implementation
pub struct InMemoryStore<V> {
    /// Cache entries storage
    entries: DashMap<CacheKey, CacheEntry<V>>,

    /// Entries removed because a read found them expired
    evictions: AtomicU64,
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InMemoryStore<V> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            evictions: AtomicU64::new(0),
        }
    }

    /// Number of entries evicted lazily since creation
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl<V> CacheStore<V> for InMemoryStore<V>
where
    V: Send + Sync,
{
    fn read(&self, key: &CacheKey) -> ReadOutcome<V> {
        let now = Instant::now();

        match self.entries.get(key) {
            None => return ReadOutcome::Miss { evicted: false },
            Some(entry) => match entry.freshness(now) {
                Freshness::Fresh => return ReadOutcome::Fresh(Arc::clone(&entry.value)),
                Freshness::Stale => return ReadOutcome::Stale(Arc::clone(&entry.value)),
                Freshness::Expired => {}
            },
        }

        // Re-check under the shard lock so an entry rewritten since `now` survives.
        let evicted = self
            .entries
            .remove_if(key, |_, entry| entry.freshness(now) == Freshness::Expired)
            .is_some();

        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Evicted expired cache entry");
        }

        ReadOutcome::Miss { evicted }
    }

    fn write(&self, key: CacheKey, value: Arc<V>, ttl: Duration) {
        self.entries.insert(key, CacheEntry::new(value, ttl));
    }

    fn peek(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    fn delete_key(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    fn delete_matching(&self, matcher: &dyn KeyMatcher) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            if matcher.matches(key) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    fn clear(&self) -> usize {
        let entry_count = self.entries.len();
        self.entries.clear();

        info!("Cleared {} entries from in-memory store", entry_count);
        entry_count
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn keys(&self) -> Vec<CacheKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::invalidation::KeyPattern;
    use crate::caching::key_generator::compute_key;
    use http::Method;
    use serde_json::Value;
    use tokio::time::advance;

    fn key(resource: &str) -> CacheKey {
        compute_key(&Method::GET, resource, &Value::Null)
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness_lifecycle() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_millis(1000);
        store.write(key("/a"), Arc::new("v1"), ttl);

        assert!(matches!(store.read(&key("/a")), ReadOutcome::Fresh(v) if *v == "v1"));

        advance(Duration::from_millis(1200)).await;
        assert!(matches!(store.read(&key("/a")), ReadOutcome::Stale(v) if *v == "v1"));
        assert_eq!(store.len(), 1);

        advance(Duration::from_millis(800)).await;
        assert!(matches!(store.read(&key("/a")), ReadOutcome::Miss { evicted: true }));
        assert!(store.is_empty());
        assert_eq!(store.evictions(), 1);

        assert!(matches!(store.read(&key("/a")), ReadOutcome::Miss { evicted: false }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_resets_stored_at() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(10);
        store.write(key("/a"), Arc::new(1), ttl);

        advance(Duration::from_secs(15)).await;
        store.write(key("/a"), Arc::new(2), ttl);

        assert!(matches!(store.read(&key("/a")), ReadOutcome::Fresh(v) if *v == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_ttl_governs() {
        let store = InMemoryStore::new();
        store.write(key("/a"), Arc::new(1), Duration::from_secs(60));
        store.write(key("/a"), Arc::new(1), Duration::from_secs(1));

        advance(Duration::from_secs(1)).await;
        assert!(matches!(store.read(&key("/a")), ReadOutcome::Stale(_)));
    }

    #[test]
    fn test_delete_and_clear() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.write(key("/a"), Arc::new(1), ttl);
        store.write(key("/b"), Arc::new(2), ttl);

        assert!(store.delete_key(&key("/a")));
        assert!(!store.delete_key(&key("/a")));
        assert!(store.peek(&key("/a")).is_none());

        assert_eq!(store.clear(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_matching() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);
        for resource in ["/users/1", "/users/2", "/orders/1"] {
            store.write(key(resource), Arc::new(resource.to_string()), ttl);
        }

        let removed = store.delete_matching(&KeyPattern::Prefix("/users/".to_string()));
        assert_eq!(removed, 2);
        assert_eq!(store.keys(), vec![key("/orders/1")]);
    }
}
