//! # Cache Events
//!
//! Broadcast of what the cache did, for observers that want more than logs.
//! Background revalidation failures are only visible here and in the logs;
//! they never reach a caller.

use super::key_generator::CacheKey;
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A fetch or revalidation stored a new value
    Stored { key: CacheKey, revalidation: bool },

    /// A synchronous fetch failed; the error went to its callers
    FetchFailed { key: CacheKey, error: String },

    /// A background revalidation failed; the stale entry was kept
    RevalidationFailed { key: CacheKey, error: String },

    /// A read found the entry expired and removed it
    Evicted { key: CacheKey },

    /// Entries were removed by `invalidate` or `invalidate_pattern`
    Invalidated { keys: usize },

    /// All entries were removed
    Cleared { keys: usize },
}

/// Sending side of the event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: CacheEvent) {
        if self.sender.receiver_count() == 0 {
            return;
        }

        if let Err(e) = self.sender.send(event) {
            trace!("Dropped cache event: {}", e);
        }
    }
}
