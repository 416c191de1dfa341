//! # Cache Stores Module
//!
//! The store maps canonical keys to the last successfully fetched value,
//! and classifies entries by freshness at read time.

pub mod memory;

pub use memory::InMemoryStore;

use super::invalidation::KeyMatcher;
use super::key_generator::CacheKey;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Freshness class of an entry, derived from its age and TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Freshness {
    /// age < ttl
    Fresh,
    /// ttl <= age < 2 * ttl
    Stale,
    /// age >= 2 * ttl
    Expired,
}

impl Freshness {
    /// Classify an age against a TTL
    pub fn classify(age: Duration, ttl: Duration) -> Self {
        if age < ttl {
            Self::Fresh
        } else if age < ttl.saturating_mul(2) {
            Self::Stale
        } else {
            Self::Expired
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Expired => "expired",
        }
    }
}

/// Cache entry with metadata
///
/// Entries are replaced as a whole on every write, never mutated in place.
pub struct CacheEntry<V> {
    /// The cached value
    pub value: Arc<V>,

    /// When the fetch that produced `value` completed
    pub stored_at: Instant,

    /// Freshness window supplied with the write
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Create a new cache entry stored now
    pub fn new(value: Arc<V>, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    /// Age of the entry at `now`
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    /// Freshness of the entry at `now`
    pub fn freshness(&self, now: Instant) -> Freshness {
        Freshness::classify(self.age(now), self.ttl)
    }
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            stored_at: self.stored_at,
            ttl: self.ttl,
        }
    }
}

impl<V> fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("stored_at", &self.stored_at)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Result of a classifying read
pub enum ReadOutcome<V> {
    /// No usable entry. `evicted` is set when an expired entry was removed by this read.
    Miss { evicted: bool },
    Fresh(Arc<V>),
    Stale(Arc<V>),
}

impl<V> fmt::Debug for ReadOutcome<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Miss { evicted } => f.debug_struct("Miss").field("evicted", evicted).finish(),
            Self::Fresh(_) => f.write_str("Fresh(..)"),
            Self::Stale(_) => f.write_str("Stale(..)"),
        }
    }
}

/// Trait for cache store implementations
///
/// All operations are in-memory and infallible.
pub trait CacheStore<V>: Send + Sync {
    /// Classify the entry for `key`, evicting it if expired
    fn read(&self, key: &CacheKey) -> ReadOutcome<V>;

    /// Insert or fully replace the entry for `key`, stamped now
    fn write(&self, key: CacheKey, value: Arc<V>, ttl: Duration);

    /// Get the raw entry without classification or eviction
    fn peek(&self, key: &CacheKey) -> Option<CacheEntry<V>>;

    /// Remove the entry for `key`, returning whether one existed
    fn delete_key(&self, key: &CacheKey) -> bool;

    /// Remove every entry whose key satisfies `matcher`, returning the count
    fn delete_matching(&self, matcher: &dyn KeyMatcher) -> usize;

    /// Remove every entry, returning the count
    fn clear(&self) -> usize;

    /// Number of entries currently held
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the keys currently held
    fn keys(&self) -> Vec<CacheKey>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let ttl = Duration::from_millis(1000);
        assert_eq!(Freshness::classify(Duration::ZERO, ttl), Freshness::Fresh);
        assert_eq!(Freshness::classify(Duration::from_millis(999), ttl), Freshness::Fresh);
        assert_eq!(Freshness::classify(Duration::from_millis(1000), ttl), Freshness::Stale);
        assert_eq!(Freshness::classify(Duration::from_millis(1999), ttl), Freshness::Stale);
        assert_eq!(Freshness::classify(Duration::from_millis(2000), ttl), Freshness::Expired);
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        assert_eq!(Freshness::classify(Duration::ZERO, Duration::ZERO), Freshness::Expired);
    }
}
