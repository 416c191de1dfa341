//! # Configuration Module
//!
//! Cache configuration with YAML loading and environment overrides.
//!
//! ## Key Features
//! - YAML parsing with serde, durations written as humantime strings (`"5m"`, `"250ms"`)
//! - Environment variable override support (`REQUEST_CACHE_*`)
//! - Validation with descriptive error messages

use crate::core::error::{CacheError, CacheResult};
use crate::observability::config::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of this cache instance, used as a metrics label and in logs
    pub name: String,

    /// Freshness window used by `fetch_default`
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Maximum resource identifier length accepted by the key generator
    pub max_resource_length: usize,

    /// Enable in-process statistics counters
    pub enable_stats: bool,

    /// Emit counters through the `metrics` facade
    pub enable_metrics: bool,

    /// Capacity of the cache event broadcast channel
    pub event_capacity: usize,

    /// Logging settings
    ///
    /// The cache never installs a subscriber on its own. Hosts that want the
    /// configured format pass this to
    /// [`init_logging`](crate::observability::init_logging) at startup.
    pub logging: LogConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            default_ttl: Duration::from_secs(300), // 5 minutes
            max_resource_length: 2048,
            enable_stats: true,
            enable_metrics: true,
            event_capacity: 1024,
            logging: LogConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| CacheError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::parse_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    ///
    /// Environment overrides are not applied.
    pub fn from_yaml_str(content: &str) -> CacheResult<Self> {
        let config = Self::parse_yaml(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_yaml(content: &str) -> CacheResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| CacheError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: REQUEST_CACHE_<FIELD>
    /// For example: REQUEST_CACHE_DEFAULT_TTL=30s
    pub fn apply_env_overrides(&mut self) -> CacheResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> CacheResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("REQUEST_CACHE_NAME") {
            self.name = name;
        }

        if let Some(ttl) = lookup("REQUEST_CACHE_DEFAULT_TTL") {
            self.default_ttl = humantime::parse_duration(&ttl)
                .map_err(|e| CacheError::config(format!("Invalid REQUEST_CACHE_DEFAULT_TTL: {}", e)))?;
        }

        if let Some(length) = lookup("REQUEST_CACHE_MAX_RESOURCE_LENGTH") {
            self.max_resource_length = length.parse().map_err(|e| {
                CacheError::config(format!("Invalid REQUEST_CACHE_MAX_RESOURCE_LENGTH: {}", e))
            })?;
        }

        if let Some(enabled) = lookup("REQUEST_CACHE_ENABLE_STATS") {
            self.enable_stats = enabled
                .parse()
                .map_err(|e| CacheError::config(format!("Invalid REQUEST_CACHE_ENABLE_STATS: {}", e)))?;
        }

        if let Some(enabled) = lookup("REQUEST_CACHE_ENABLE_METRICS") {
            self.enable_metrics = enabled.parse().map_err(|e| {
                CacheError::config(format!("Invalid REQUEST_CACHE_ENABLE_METRICS: {}", e))
            })?;
        }

        if let Some(level) = lookup("REQUEST_CACHE_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> CacheResult<()> {
        if self.name.trim().is_empty() {
            return Err(CacheError::config("Cache name cannot be empty"));
        }

        if self.default_ttl.is_zero() {
            return Err(CacheError::config("default_ttl must be greater than zero"));
        }

        if self.max_resource_length == 0 {
            return Err(CacheError::config("max_resource_length must be greater than zero"));
        }

        if self.event_capacity == 0 {
            return Err(CacheError::config("event_capacity must be greater than zero"));
        }

        Ok(())
    }
}
