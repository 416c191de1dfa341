//! # Caching System Module
//!
//! Stale-while-revalidate caching of remote reads with concurrent request
//! coalescing.
//!
//! ## Architecture
//! 1. **Key Generator**: canonical keys from (method, resource, payload)
//! 2. **Cache Stores**: entries with per-write TTL, classified on read
//! 3. **Deduplication**: at most one in-flight transport call per key
//! 4. **Cache Manager**: the [`RequestCache`] facade tying them together
//! 5. **Invalidation**: exact and pattern-based removal
//!
//! ## Usage Example
//! ```rust,no_run
//! use request_cache::caching::{KeyPattern, RequestCache};
//! use request_cache::core::types::{transport_fn, RequestDescriptor};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = transport_fn(|request: RequestDescriptor| async move {
//!     Ok::<_, std::io::Error>(format!("body of {}", request.resource))
//! });
//! let cache = RequestCache::with_defaults(transport);
//!
//! let request = RequestDescriptor::get("/api/users/42");
//! let user = cache.fetch(&request, Duration::from_secs(30)).await?;
//!
//! // After updating the user, drop every cached read of it
//! cache.invalidate_pattern(&KeyPattern::Prefix("/api/users/42".to_string()));
//! # let _ = user;
//! # Ok(())
//! # }
//! ```

pub mod cache_manager;
pub mod deduplication;
pub mod events;
pub mod invalidation;
pub mod key_generator;
pub mod stores;

pub use cache_manager::{CacheStats, RequestCache, RequestCacheBuilder};
pub use deduplication::{PendingFetch, RequestCoordinator};
pub use events::CacheEvent;
pub use invalidation::{KeyMatcher, KeyPattern};
pub use key_generator::{compute_key, CacheKey, DefaultKeyGenerator, KeyGenerator};
pub use stores::{CacheEntry, CacheStore, Freshness, InMemoryStore, ReadOutcome};
