//! # Request Cache
//!
//! A stale-while-revalidate cache for remote reads. Concurrent requests for
//! the same resource share one transport call, fresh data is served without
//! touching the network, stale data is served while a single background
//! refresh runs, and a failed refresh never throws away good-but-old data.
//!
//! The network itself is abstracted behind [`Transport`]; the cache never
//! looks inside responses or errors.

/// Configuration, error types and the request/transport boundary
pub mod core;

/// Key generation, stores, request coalescing and the cache facade
pub mod caching;

/// Logging setup and metrics counters
pub mod observability;

pub use crate::core::config::CacheConfig;
pub use crate::core::error::{CacheError, CacheResult, FetchError};
pub use crate::core::types::{transport_fn, FnTransport, RequestDescriptor, Transport};

pub use caching::{CacheEvent, CacheKey, CacheStats, KeyMatcher, KeyPattern, RequestCache};
