//! # Cache Invalidation Module
//!
//! Matchers used for bulk invalidation. A write-side mutation (say, an update
//! to `/users/42`) typically invalidates every cached read of that resource
//! family with a prefix or glob pattern.

use super::key_generator::CacheKey;
use crate::core::error::{CacheError, CacheResult};
use http::Method;
use regex::Regex;

/// Predicate over cache keys
pub trait KeyMatcher: Send + Sync {
    fn matches(&self, key: &CacheKey) -> bool;
}

impl<F> KeyMatcher for F
where
    F: Fn(&CacheKey) -> bool + Send + Sync,
{
    fn matches(&self, key: &CacheKey) -> bool {
        self(key)
    }
}

/// Common invalidation patterns
///
/// All variants except `Method` and `All` match against the resource portion of the key.
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Resource equals the given string, for any method and payload
    Exact(String),

    /// Resource starts with the given prefix
    Prefix(String),

    /// Resource contains the given substring
    Contains(String),

    /// Resource matches a regular expression
    Regex(Regex),

    /// Key was produced with this method
    Method(Method),

    /// Every key
    All,
}

impl KeyPattern {
    /// Build a pattern from a glob where `*` matches any run of characters
    pub fn glob(pattern: &str) -> CacheResult<Self> {
        if !pattern.contains('*') {
            return Ok(Self::Exact(pattern.to_string()));
        }

        let translated = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        Self::regex(&format!("^{}$", translated))
    }

    /// Build a pattern from a regular expression
    pub fn regex(pattern: &str) -> CacheResult<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| CacheError::key_generation(format!("Invalid key pattern {}: {}", pattern, e)))
    }
}

impl KeyMatcher for KeyPattern {
    fn matches(&self, key: &CacheKey) -> bool {
        let resource = key.resource();
        match self {
            Self::Exact(exact) => resource == exact,
            Self::Prefix(prefix) => resource.starts_with(prefix.as_str()),
            Self::Contains(needle) => resource.contains(needle.as_str()),
            Self::Regex(regex) => regex.is_match(resource),
            Self::Method(method) => key.method() == method.as_str(),
            Self::All => true,
        }
    }
}
