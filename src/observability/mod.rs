// Logging configuration
pub mod config;

// Counters through the metrics facade
pub mod metrics;

// Structured logging
pub mod logging;

// Re-export commonly used types for convenience
pub use config::{LogConfig, LogFormat};
pub use logging::init_logging;
pub use metrics::{CacheMetrics, RevalidationOutcome};
