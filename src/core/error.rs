//! # Error Handling Module
//!
//! Error types for the request cache, built on the `thiserror` crate.
//!
//! Two layers exist:
//! - [`CacheError`] covers failures that originate in the cache itself
//!   (key generation, configuration, a missing runtime, a fetch task torn
//!   down mid-flight).
//! - [`FetchError`] is what [`RequestCache::fetch`](crate::RequestCache::fetch)
//!   returns. Transport failures are carried through untouched inside an
//!   `Arc`, so every caller coalesced onto the same request observes the
//!   identical error value.

use std::sync::Arc;
use thiserror::Error;

/// Result type used by cache operations that cannot fail in the transport
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The request descriptor could not be turned into a canonical key
    #[error("Key generation error: {message}")]
    KeyGeneration { message: String },

    /// Invalid or unreadable cache configuration
    #[error("Cache configuration error: {message}")]
    Configuration { message: String },

    /// A fetch was attempted outside a tokio runtime
    #[error("No tokio runtime available to run the fetch: {message}")]
    Runtime { message: String },

    /// The in-flight fetch ended without producing a result
    #[error("In-flight request for {key} was cancelled before it settled")]
    Cancelled { key: String },
}

impl CacheError {
    /// Create a key generation error with a custom message
    pub fn key_generation<S: Into<String>>(message: S) -> Self {
        Self::KeyGeneration {
            message: message.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a runtime error with a custom message
    pub fn runtime<S: Into<String>>(message: S) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Get a string representation of the error type for logs and events
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::KeyGeneration { .. } => "key_generation_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Runtime { .. } => "runtime_error",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::KeyGeneration {
            message: format!("payload is not serializable: {}", err),
        }
    }
}

/// Error returned by a cached fetch
///
/// `E` is the transport's own error type. It is never wrapped or
/// reclassified: `Transport` forwards `Display` and `source` to it.
#[derive(Debug, Error)]
pub enum FetchError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Transport(Arc<E>),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl<E> FetchError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The transport error, if this failure came from the transport
    pub fn transport(&self) -> Option<&Arc<E>> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Cache(_) => None,
        }
    }

    /// Whether the failure was produced by the transport
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl<E> Clone for FetchError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        match self {
            Self::Transport(err) => Self::Transport(Arc::clone(err)),
            Self::Cache(err) => Self::Cache(err.clone()),
        }
    }
}
