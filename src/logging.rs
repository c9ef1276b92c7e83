//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events; binaries call [`init`] once
//! to install a formatter. `RUST_LOG`, when set, takes precedence over the
//! configured level.
//!
//! # Example
//! ```no_run
//! use pxi_sync::{config::SyncConfig, logging};
//!
//! let config = SyncConfig::load(None)?;
//! logging::init(&config.logging)?;
//! tracing::info!("ready");
//! # Ok::<(), pxi_sync::SyncError>(())
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LoggingConfig, OutputFormat};
use crate::error::{Result, SyncError};

/// Install the global subscriber described by `config`.
///
/// Idempotent: if a subscriber is already installed this returns `Ok(())`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let layer = match config.format {
        OutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_thread_names(true)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_ansi(false)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Json => fmt::layer()
            .json()
            .with_thread_names(true)
            .with_filter(env_filter)
            .boxed(),
    };

    // try_init only fails when a global subscriber or logger is already in place.
    if let Err(e) = tracing_subscriber::registry().with(layer).try_init() {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
    Ok(())
}

/// Parse a level name, case-insensitively.
pub fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(SyncError::Config(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}
