//! Core types and utilities for the `trunkr` live trunking monitor

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{DatabaseConfig, LoggingConfig, StoreConfig};
pub use error::{Error, Result};
pub use types::{
    ActiveCallSession, CompletedCallRecord, RadioId, StateSnapshot, StreamKind, TalkgroupId,
    TalkgroupInfo, UnitAction, UnitActivityEvent, UnixSeconds,
};
pub use utils::{Clock, ManualClock, SystemClock};

/// Guard that must be held for the lifetime of the process when logging to a file
pub type LogGuard = tracing_appender::non_blocking::WorkerGuard;

/// Initialize the logging system
///
/// Console output honours `RUST_LOG` first and falls back to the configured
/// level. When [`LoggingConfig::directory`] is set, a daily rolling file is
/// written there as well and the returned guard must be kept alive.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<LogGuard>> {
    use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console = if config.format == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().pretty().boxed()
    };

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Configuration {
            message: format!("Failed to initialize logging: {e}"),
        })?;

    Ok(guard)
}
