//! # Cache Metrics
//!
//! Counters emitted through the `metrics` facade. Installing a recorder
//! (Prometheus exporter or otherwise) is the host application's job; without
//! one these calls are no-ops.

use metrics::counter;

pub const HITS_TOTAL: &str = "request_cache_hits_total";
pub const MISSES_TOTAL: &str = "request_cache_misses_total";
pub const TRANSPORT_CALLS_TOTAL: &str = "request_cache_transport_calls_total";
pub const COALESCED_TOTAL: &str = "request_cache_coalesced_total";
pub const FETCH_FAILURES_TOTAL: &str = "request_cache_fetch_failures_total";
pub const REVALIDATIONS_TOTAL: &str = "request_cache_revalidations_total";
pub const INVALIDATIONS_TOTAL: &str = "request_cache_invalidations_total";
pub const EVICTIONS_TOTAL: &str = "request_cache_evictions_total";

/// Outcome label for background revalidations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidationOutcome {
    Started,
    Succeeded,
    Failed,
}

impl RevalidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Per-instance metrics handle, labelled with the cache name
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    enabled: bool,
    cache: String,
}

impl CacheMetrics {
    pub fn new(cache: impl Into<String>, enabled: bool) -> Self {
        Self {
            enabled,
            cache: cache.into(),
        }
    }

    pub fn hit(&self, freshness: &'static str) {
        if self.enabled {
            counter!(HITS_TOTAL, "cache" => self.cache.clone(), "freshness" => freshness).increment(1);
        }
    }

    pub fn miss(&self) {
        if self.enabled {
            counter!(MISSES_TOTAL, "cache" => self.cache.clone()).increment(1);
        }
    }

    pub fn transport_call(&self) {
        if self.enabled {
            counter!(TRANSPORT_CALLS_TOTAL, "cache" => self.cache.clone()).increment(1);
        }
    }

    pub fn coalesced(&self) {
        if self.enabled {
            counter!(COALESCED_TOTAL, "cache" => self.cache.clone()).increment(1);
        }
    }

    pub fn fetch_failed(&self) {
        if self.enabled {
            counter!(FETCH_FAILURES_TOTAL, "cache" => self.cache.clone()).increment(1);
        }
    }

    pub fn revalidation(&self, outcome: RevalidationOutcome) {
        if self.enabled {
            counter!(REVALIDATIONS_TOTAL, "cache" => self.cache.clone(), "outcome" => outcome.as_str())
                .increment(1);
        }
    }

    pub fn invalidated(&self, count: usize) {
        if self.enabled && count > 0 {
            counter!(INVALIDATIONS_TOTAL, "cache" => self.cache.clone()).increment(count as u64);
        }
    }

    pub fn evicted(&self) {
        if self.enabled {
            counter!(EVICTIONS_TOTAL, "cache" => self.cache.clone()).increment(1);
        }
    }
}
