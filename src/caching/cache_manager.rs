//! # Cache Manager
//!
//! [`RequestCache`] is the single entry point consumers call. It implements
//! stale-while-revalidate on top of the key generator, the store and the
//! request coordinator:
//!
//! - **Fresh** hit: returned immediately, no transport activity.
//! - **Stale** hit: returned immediately; one background revalidation is
//!   started unless a request for the key is already in flight. A failed
//!   revalidation leaves the entry untouched.
//! - **Miss** (including an entry just evicted as expired): the caller waits
//!   on a deduplicated fetch. Success is stored with the caller's TTL,
//!   failure is stored nowhere and goes to every coalesced caller.
//!
//! `RequestCache` is a cheap handle around shared state; clone it to share
//! one cache between components. Separate instances never interact.

use super::deduplication::{PendingFetch, RequestCoordinator};
use super::events::{CacheEvent, EventBus};
use super::invalidation::KeyMatcher;
use super::key_generator::{CacheKey, DefaultKeyGenerator, KeyGenerator};
use super::stores::{CacheEntry, CacheStore, InMemoryStore, ReadOutcome};
use crate::core::config::CacheConfig;
use crate::core::error::{CacheResult, FetchError};
use crate::core::types::{RequestDescriptor, Transport};
use crate::observability::metrics::{CacheMetrics, RevalidationOutcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads answered from a fresh entry
    pub fresh_hits: u64,

    /// Reads answered from a stale entry
    pub stale_hits: u64,

    /// Reads that had to wait for a fetch
    pub misses: u64,

    /// Calls made to the transport
    pub transport_calls: u64,

    /// Callers that joined a request already in flight
    pub coalesced: u64,

    /// Background revalidations started
    pub revalidations_started: u64,

    /// Background revalidations that stored a new value
    pub revalidations_succeeded: u64,

    /// Background revalidations whose failure was swallowed
    pub revalidations_failed: u64,

    /// Synchronous fetches that failed
    pub fetch_failures: u64,

    /// Entries removed by invalidation or clear
    pub invalidated: u64,

    /// Expired entries removed by reads
    pub evictions: u64,

    /// Share of reads answered from the cache
    pub hit_ratio: f64,

    /// Entries currently stored
    pub entries: usize,

    /// Keys with a request in flight
    pub pending: usize,

    /// Statistics collection start time
    pub start_time: DateTime<Utc>,
}

#[derive(Default)]
struct StatsCounters {
    fresh_hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    transport_calls: AtomicU64,
    coalesced: AtomicU64,
    revalidations_started: AtomicU64,
    revalidations_succeeded: AtomicU64,
    revalidations_failed: AtomicU64,
    fetch_failures: AtomicU64,
    invalidated: AtomicU64,
    evictions: AtomicU64,
}

impl StatsCounters {
    fn counters(&self) -> [&AtomicU64; 11] {
        [
            &self.fresh_hits,
            &self.stale_hits,
            &self.misses,
            &self.transport_calls,
            &self.coalesced,
            &self.revalidations_started,
            &self.revalidations_succeeded,
            &self.revalidations_failed,
            &self.fetch_failures,
            &self.invalidated,
            &self.evictions,
        ]
    }

    fn reset(&self) {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Why a fetch was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchOrigin {
    Miss,
    Revalidation,
}

struct Inner<T: Transport> {
    config: CacheConfig,
    transport: T,
    key_generator: Box<dyn KeyGenerator>,
    store: Box<dyn CacheStore<T::Response>>,
    coordinator: RequestCoordinator<T::Response, T::Error>,
    counters: StatsCounters,
    start_time: Mutex<DateTime<Utc>>,
    metrics: CacheMetrics,
    events: EventBus,
}

impl<T: Transport> Inner<T> {
    fn record(&self, counter: &AtomicU64, amount: u64) {
        if self.config.enable_stats {
            counter.fetch_add(amount, Ordering::Relaxed);
        }
    }
}

/// Stale-while-revalidate request cache
pub struct RequestCache<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for RequestCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`RequestCache`] with a custom key generator or store
pub struct RequestCacheBuilder<T: Transport> {
    transport: T,
    config: CacheConfig,
    key_generator: Option<Box<dyn KeyGenerator>>,
    store: Option<Box<dyn CacheStore<T::Response>>>,
}

impl<T: Transport> RequestCacheBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: CacheConfig::default(),
            key_generator: None,
            store: None,
        }
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn key_generator(mut self, key_generator: impl KeyGenerator + 'static) -> Self {
        self.key_generator = Some(Box::new(key_generator));
        self
    }

    pub fn store(mut self, store: impl CacheStore<T::Response> + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Validate the configuration and build the cache
    pub fn build(self) -> CacheResult<RequestCache<T>> {
        self.config.validate()?;

        let key_generator = self
            .key_generator
            .unwrap_or_else(|| Box::new(DefaultKeyGenerator::new(self.config.max_resource_length)));
        let store = self
            .store
            .unwrap_or_else(|| Box::new(InMemoryStore::<T::Response>::new()));

        info!(
            cache = %self.config.name,
            default_ttl = ?self.config.default_ttl,
            "Request cache initialized"
        );

        Ok(RequestCache::assemble(self.transport, self.config, key_generator, store))
    }
}

impl<T: Transport> RequestCache<T> {
    /// Create a cache with the given configuration
    pub fn new(transport: T, config: CacheConfig) -> CacheResult<Self> {
        RequestCacheBuilder::new(transport).config(config).build()
    }

    /// Create a cache with the default configuration
    pub fn with_defaults(transport: T) -> Self {
        let config = CacheConfig::default();
        let key_generator = Box::new(DefaultKeyGenerator::new(config.max_resource_length));
        Self::assemble(
            transport,
            config,
            key_generator,
            Box::new(InMemoryStore::<T::Response>::new()),
        )
    }

    fn assemble(
        transport: T,
        config: CacheConfig,
        key_generator: Box<dyn KeyGenerator>,
        store: Box<dyn CacheStore<T::Response>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                metrics: CacheMetrics::new(config.name.clone(), config.enable_metrics),
                events: EventBus::new(config.event_capacity),
                config,
                transport,
                key_generator,
                store,
                coordinator: RequestCoordinator::new(),
                counters: StatsCounters::default(),
                start_time: Mutex::new(Utc::now()),
            }),
        }
    }

    pub fn builder(transport: T) -> RequestCacheBuilder<T> {
        RequestCacheBuilder::new(transport)
    }

    /// Get cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Fetch a resource with the given freshness window
    ///
    /// See the module documentation for the exact policy. Transport errors
    /// are returned as [`FetchError::Transport`] carrying the transport's own
    /// error; key generation problems fail before any lookup.
    ///
    /// Fetches run as tokio tasks. Outside a tokio runtime only fresh and
    /// stale hits succeed; anything needing the transport fails with
    /// [`CacheError::Runtime`](crate::CacheError::Runtime).
    pub async fn fetch(
        &self,
        request: &RequestDescriptor,
        ttl: Duration,
    ) -> Result<Arc<T::Response>, FetchError<T::Error>> {
        let inner = &self.inner;
        let key = inner.key_generator.generate_key(request)?;

        match inner.store.read(&key) {
            ReadOutcome::Fresh(value) => {
                inner.record(&inner.counters.fresh_hits, 1);
                inner.metrics.hit("fresh");
                debug!(key = %key, "Cache hit (fresh)");
                return Ok(value);
            }
            ReadOutcome::Stale(value) => {
                inner.record(&inner.counters.stale_hits, 1);
                inner.metrics.hit("stale");
                debug!(key = %key, "Cache hit (stale), revalidating in background");
                self.revalidate(&key, request, ttl);
                return Ok(value);
            }
            ReadOutcome::Miss { evicted } => {
                if evicted {
                    inner.record(&inner.counters.evictions, 1);
                    inner.metrics.evicted();
                    inner.events.publish(CacheEvent::Evicted { key: key.clone() });
                }
                inner.record(&inner.counters.misses, 1);
                inner.metrics.miss();
                debug!(key = %key, evicted, "Cache miss");
            }
        }

        let pending = self.start_fetch(&key, request, ttl, FetchOrigin::Miss)?;
        if !pending.started {
            inner.record(&inner.counters.coalesced, 1);
            inner.metrics.coalesced();
        }

        pending.future.await
    }

    /// Fetch a resource using the configured default TTL
    pub async fn fetch_default(
        &self,
        request: &RequestDescriptor,
    ) -> Result<Arc<T::Response>, FetchError<T::Error>> {
        self.fetch(request, self.inner.config.default_ttl).await
    }

    /// Remove the entry for exactly this request
    ///
    /// A request already in flight for the key is not cancelled and will
    /// store its result when it completes.
    pub fn invalidate(&self, request: &RequestDescriptor) -> CacheResult<bool> {
        let key = self.inner.key_generator.generate_key(request)?;
        let removed = self.inner.store.delete_key(&key);

        if removed {
            self.after_invalidation(1);
            debug!(key = %key, "Invalidated cache key");
        }

        Ok(removed)
    }

    /// Remove every entry whose key satisfies `matcher`
    ///
    /// Requests in flight are unaffected.
    pub fn invalidate_pattern<M: KeyMatcher>(&self, matcher: &M) -> usize {
        let removed = self.inner.store.delete_matching(matcher);

        if removed > 0 {
            self.after_invalidation(removed);
            info!(cache = %self.inner.config.name, removed, "Invalidated cache entries by pattern");
        }

        removed
    }

    /// Remove every entry
    pub fn clear(&self) -> usize {
        let removed = self.inner.store.clear();
        self.inner.record(&self.inner.counters.invalidated, removed as u64);
        self.inner.metrics.invalidated(removed);
        self.inner.events.publish(CacheEvent::Cleared { keys: removed });

        info!(cache = %self.inner.config.name, removed, "All cache entries cleared");
        removed
    }

    /// The stored entry for this request, without classification or eviction
    pub fn inspect(&self, request: &RequestDescriptor) -> CacheResult<Option<CacheEntry<T::Response>>> {
        let key = self.inner.key_generator.generate_key(request)?;
        Ok(self.inner.store.peek(&key))
    }

    /// Whether a fetch or revalidation for this request is in flight
    pub fn is_pending(&self, request: &RequestDescriptor) -> CacheResult<bool> {
        let key = self.inner.key_generator.generate_key(request)?;
        Ok(self.inner.coordinator.is_pending(&key))
    }

    /// Keys currently stored
    pub fn keys(&self) -> Vec<CacheKey> {
        self.inner.store.keys()
    }

    /// Subscribe to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        let fresh_hits = load(&counters.fresh_hits);
        let stale_hits = load(&counters.stale_hits);
        let misses = load(&counters.misses);
        let reads = fresh_hits + stale_hits + misses;

        CacheStats {
            fresh_hits,
            stale_hits,
            misses,
            transport_calls: load(&counters.transport_calls),
            coalesced: load(&counters.coalesced),
            revalidations_started: load(&counters.revalidations_started),
            revalidations_succeeded: load(&counters.revalidations_succeeded),
            revalidations_failed: load(&counters.revalidations_failed),
            fetch_failures: load(&counters.fetch_failures),
            invalidated: load(&counters.invalidated),
            evictions: load(&counters.evictions),
            hit_ratio: if reads > 0 {
                (fresh_hits + stale_hits) as f64 / reads as f64
            } else {
                0.0
            },
            entries: self.inner.store.len(),
            pending: self.inner.coordinator.pending_count(),
            start_time: *self.inner.start_time.lock(),
        }
    }

    /// Reset cache statistics
    pub fn reset_stats(&self) {
        self.inner.counters.reset();
        *self.inner.start_time.lock() = Utc::now();
        info!(cache = %self.inner.config.name, "Cache statistics reset");
    }

    fn after_invalidation(&self, removed: usize) {
        self.inner.record(&self.inner.counters.invalidated, removed as u64);
        self.inner.metrics.invalidated(removed);
        self.inner.events.publish(CacheEvent::Invalidated { keys: removed });
    }

    /// Start a background refresh unless one is already in flight
    fn revalidate(&self, key: &CacheKey, request: &RequestDescriptor, ttl: Duration) {
        let pending = match self.start_fetch(key, request, ttl, FetchOrigin::Revalidation) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(key = %key, error = %e, "Could not start background revalidation");
                return;
            }
        };

        if pending.started {
            self.inner.record(&self.inner.counters.revalidations_started, 1);
            self.inner.metrics.revalidation(RevalidationOutcome::Started);
        } else {
            debug!(key = %key, "Revalidation already in flight");
        }
        // The fetch runs in its own task; nobody awaits it from here.
    }

    fn start_fetch(
        &self,
        key: &CacheKey,
        request: &RequestDescriptor,
        ttl: Duration,
        origin: FetchOrigin,
    ) -> CacheResult<PendingFetch<T::Response, T::Error>> {
        let inner = Arc::clone(&self.inner);
        let request = request.clone();
        let key_for_task = key.clone();

        self.inner.coordinator.get_or_start(key, move || async move {
            let key = key_for_task;
            inner.record(&inner.counters.transport_calls, 1);
            inner.metrics.transport_call();

            match inner.transport.call(&request).await {
                Ok(response) => {
                    let value = Arc::new(response);
                    inner.store.write(key.clone(), Arc::clone(&value), ttl);

                    if origin == FetchOrigin::Revalidation {
                        inner.record(&inner.counters.revalidations_succeeded, 1);
                        inner.metrics.revalidation(RevalidationOutcome::Succeeded);
                    }
                    debug!(key = %key, ttl = ?ttl, ?origin, "Stored fetched value");
                    inner.events.publish(CacheEvent::Stored {
                        key,
                        revalidation: origin == FetchOrigin::Revalidation,
                    });

                    Ok(value)
                }
                Err(error) => {
                    match origin {
                        FetchOrigin::Revalidation => {
                            inner.record(&inner.counters.revalidations_failed, 1);
                            inner.metrics.revalidation(RevalidationOutcome::Failed);
                            warn!(key = %key, error = %error, "Background revalidation failed, keeping stale entry");
                            inner.events.publish(CacheEvent::RevalidationFailed {
                                key,
                                error: error.to_string(),
                            });
                        }
                        FetchOrigin::Miss => {
                            inner.record(&inner.counters.fetch_failures, 1);
                            inner.metrics.fetch_failed();
                            debug!(key = %key, error = %error, "Fetch failed, nothing cached");
                            inner.events.publish(CacheEvent::FetchFailed {
                                key,
                                error: error.to_string(),
                            });
                        }
                    }

                    Err(Arc::new(error))
                }
            }
        })
    }
}
