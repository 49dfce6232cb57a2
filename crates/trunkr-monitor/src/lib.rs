//! Live monitor for radio trunking activity
//!
//! Follows the unit activity and completed call streams of the event store,
//! keeps windowed views of recent activity, infers which talkgroups are
//! currently transmitting and notifies observers after every refresh.
//!
//! Change delivery prefers push notifications and falls back to polling per
//! stream when push is unavailable or lost.

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
pub mod health;
pub mod notifier;
pub mod observer;
pub mod reconcile;
pub mod service;
pub mod state;

// Re-export commonly used types
pub use config::{MonitorConfig, PollingConfig, ServiceConfig, WindowConfig};
pub use error::{MonitorError, Result};
pub use health::HealthStatus;
pub use notifier::{ChangeNotifier, ModeEvent, StreamMode};
pub use observer::{ObserverId, StateObserver};
pub use reconcile::reconcile_active;
pub use service::{MonitorService, ServiceStatus};
pub use state::{WindowedState, derive_active_sessions};

/// Initialize the monitoring service with configuration from files and environment
///
/// # Errors
///
/// Returns [`MonitorError`] if:
/// - Configuration loading fails
/// - Invalid configuration parameters
/// - The connection pool cannot be created
pub async fn init() -> Result<MonitorService> {
    let config = MonitorConfig::load()?;
    MonitorService::new(config).await
}

/// Initialize the monitoring service with custom configuration
///
/// # Errors
///
/// Returns [`MonitorError`] if:
/// - Invalid configuration parameters
/// - The connection pool cannot be created
pub async fn init_with_config(config: MonitorConfig) -> Result<MonitorService> {
    MonitorService::new(config).await
}
