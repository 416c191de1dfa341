//! # Structured Logging
//!
//! Installs a `tracing-subscriber` registry for hosts that want the cache to
//! set up logging. Libraries embedding the cache into an existing subscriber
//! can skip this entirely; every cache log line is an ordinary `tracing` event.

use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::observability::config::{LogConfig, LogFormat};

/// Parse a textual log level, falling back to `INFO`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the global tracing subscriber
///
/// Returns `false` when another subscriber was already installed, in which
/// case the existing one stays in effect.
pub fn init_logging(config: &LogConfig) -> bool {
    let level = parse_level(&config.level);
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(config.with_thread_ids),
            )
            .try_init()
            .is_ok(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(config.with_thread_ids),
            )
            .try_init()
            .is_ok(),
    };

    if installed {
        info!(level = %level, format = ?config.format, "Structured logging initialized");
    } else {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }

    installed
}
