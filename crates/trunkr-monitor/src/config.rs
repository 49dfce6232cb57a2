//! Configuration management for the live monitor

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use trunkr_core::{DatabaseConfig, LoggingConfig, StoreConfig};

/// Main configuration for the live monitor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Database connection (shared with `trunkr-core`)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Table and channel names
    #[serde(default)]
    pub store: StoreConfig,

    /// Trailing windows and cache bounds
    #[serde(default)]
    pub window: WindowConfig,

    /// Poller and push listener timing
    #[serde(default)]
    pub polling: PollingConfig,

    /// Service lifecycle
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Trailing windows used by the state aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// A talkgroup with a `call` event this recent is active (seconds)
    #[serde(default = "default_active_window")]
    pub active_window_seconds: u64,

    /// Age limit of the recent unit activity cache (seconds)
    #[serde(default = "default_recent_window")]
    pub units_window_seconds: u64,

    /// Maximum entries in the recent unit activity cache
    #[serde(default = "default_units_limit")]
    pub units_limit: usize,

    /// Age limit of the recent completed call cache (seconds)
    #[serde(default = "default_recent_window")]
    pub calls_window_seconds: u64,

    /// Maximum entries in the recent completed call cache
    #[serde(default = "default_calls_limit")]
    pub calls_limit: usize,

    /// Newest unit event must be this recent for data to count as fresh (seconds)
    #[serde(default = "default_freshness_threshold")]
    pub freshness_threshold_seconds: u64,
}

/// Timing of the change notification manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Sleep between idle poller ticks (milliseconds)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Sleep after a poller or reconnect error (milliseconds)
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,

    /// Poll a push stream only after this long without a push signal (milliseconds)
    #[serde(default = "default_push_quiet_period")]
    pub push_quiet_period_ms: u64,

    /// How far back the poller looks for new rows (seconds)
    #[serde(default = "default_probe_window")]
    pub probe_window_seconds: u64,

    /// Longest single wait on a live subscription (milliseconds)
    #[serde(default = "default_listen_max_wait")]
    pub listen_max_wait_ms: u64,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Graceful shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

// Default value functions
const fn default_active_window() -> u64 {
    180
}

const fn default_recent_window() -> u64 {
    300
}

const fn default_units_limit() -> usize {
    100
}

const fn default_calls_limit() -> usize {
    50
}

const fn default_freshness_threshold() -> u64 {
    10
}

const fn default_tick_interval() -> u64 {
    100
}

const fn default_error_backoff() -> u64 {
    1000
}

const fn default_push_quiet_period() -> u64 {
    1000
}

const fn default_probe_window() -> u64 {
    5
}

const fn default_listen_max_wait() -> u64 {
    500
}

fn default_service_name() -> String {
    "trunkr-monitor".to_string()
}

const fn default_shutdown_timeout() -> u64 {
    30
}

fn secs(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl WindowConfig {
    /// Active window in whole seconds
    #[must_use]
    pub fn active_window(&self) -> i64 {
        secs(self.active_window_seconds)
    }

    /// Recent units window in whole seconds
    #[must_use]
    pub fn units_window(&self) -> i64 {
        secs(self.units_window_seconds)
    }

    /// Recent calls window in whole seconds
    #[must_use]
    pub fn calls_window(&self) -> i64 {
        secs(self.calls_window_seconds)
    }

    /// Freshness threshold in whole seconds
    #[must_use]
    pub fn freshness_threshold(&self) -> i64 {
        secs(self.freshness_threshold_seconds)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            active_window_seconds: default_active_window(),
            units_window_seconds: default_recent_window(),
            units_limit: default_units_limit(),
            calls_window_seconds: default_recent_window(),
            calls_limit: default_calls_limit(),
            freshness_threshold_seconds: default_freshness_threshold(),
        }
    }
}

impl PollingConfig {
    /// Get idle tick interval as Duration
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Get error backoff as Duration
    #[must_use]
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Get push quiet period as Duration
    #[must_use]
    pub const fn push_quiet_period(&self) -> Duration {
        Duration::from_millis(self.push_quiet_period_ms)
    }

    /// Probe window in whole seconds
    #[must_use]
    pub fn probe_window(&self) -> i64 {
        secs(self.probe_window_seconds)
    }

    /// Get subscription wait bound as Duration
    #[must_use]
    pub const fn listen_max_wait(&self) -> Duration {
        Duration::from_millis(self.listen_max_wait_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            error_backoff_ms: default_error_backoff(),
            push_quiet_period_ms: default_push_quiet_period(),
            probe_window_seconds: default_probe_window(),
            listen_max_wait_ms: default_listen_max_wait(),
        }
    }
}

impl ServiceConfig {
    /// Get shutdown timeout as Duration
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment and files
    ///
    /// Reads optional `monitor.*` and `config.*` files from the working
    /// directory, then `TRUNKR_MONITOR_*` environment variables
    /// (`TRUNKR_MONITOR_WINDOW__UNITS_LIMIT=200`).
    ///
    /// # Errors
    ///
    /// Returns [`crate::MonitorError::Configuration`] if:
    /// - Configuration files contain invalid TOML/JSON syntax
    /// - Configuration values are out of valid ranges
    /// - Environment variables have invalid values
    pub fn load() -> crate::Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::with_name("monitor").required(false))
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("TRUNKR_MONITOR")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`crate::MonitorError::Configuration`] if the file cannot be
    /// read, parsed or validated.
    pub async fn from_file(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            crate::MonitorError::configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::MonitorError::configuration(format!("Failed to parse config file: {e}"))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges across all sections
    ///
    /// # Errors
    ///
    /// Returns [`crate::MonitorError::Configuration`] naming the first bad value.
    pub fn validate(&self) -> crate::Result<()> {
        self.database.check()?;
        self.store.check()?;

        let window = &self.window;
        if window.units_limit == 0 || window.calls_limit == 0 {
            return Err(crate::MonitorError::configuration(
                "window: cache limits must be positive",
            ));
        }
        // Sessions are derived from the recent units cache
        if window.active_window_seconds > window.units_window_seconds {
            return Err(crate::MonitorError::configuration(
                "window.active_window_seconds must not exceed window.units_window_seconds",
            ));
        }

        let polling = &self.polling;
        if polling.tick_interval_ms == 0 || polling.listen_max_wait_ms == 0 {
            return Err(crate::MonitorError::configuration(
                "polling: tick_interval_ms and listen_max_wait_ms must be positive",
            ));
        }
        if polling.probe_window_seconds == 0 {
            return Err(crate::MonitorError::configuration(
                "polling.probe_window_seconds must be positive",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_functions() {
        assert_eq!(default_active_window(), 180);
        assert_eq!(default_recent_window(), 300);
        assert_eq!(default_units_limit(), 100);
        assert_eq!(default_calls_limit(), 50);
        assert_eq!(default_freshness_threshold(), 10);
        assert_eq!(default_tick_interval(), 100);
        assert_eq!(default_error_backoff(), 1000);
        assert_eq!(default_push_quiet_period(), 1000);
        assert_eq!(default_probe_window(), 5);
        assert_eq!(default_listen_max_wait(), 500);
        assert_eq!(default_service_name(), "trunkr-monitor");
    }

    #[test]
    fn test_duration_accessors() {
        let polling = PollingConfig::default();
        assert_eq!(polling.tick_interval(), Duration::from_millis(100));
        assert_eq!(polling.error_backoff(), Duration::from_secs(1));
        assert_eq!(polling.push_quiet_period(), Duration::from_secs(1));
        assert_eq!(polling.listen_max_wait(), Duration::from_millis(500));
        assert_eq!(polling.probe_window(), 5);

        let service = ServiceConfig::default();
        assert_eq!(service.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_window_seconds_saturate() {
        let window = WindowConfig {
            active_window_seconds: u64::MAX,
            ..WindowConfig::default()
        };
        assert_eq!(window.active_window(), i64::MAX);
        assert_eq!(window.units_window(), 300);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_active_window_wider_than_cache() {
        let mut config = MonitorConfig::default();
        config.window.active_window_seconds = 600;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("active_window_seconds"));
    }

    #[test]
    fn test_validate_rejects_zero_limits_and_ticks() {
        let mut config = MonitorConfig::default();
        config.window.calls_limit = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.polling.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.polling.probe_window_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_store_names() {
        let mut config = MonitorConfig::default();
        config.store.units_channel = "units-channel".to_string();
        assert!(matches!(
            config.validate(),
            Err(crate::MonitorError::Configuration { .. })
        ));
    }

    #[test]
    fn test_partial_config_with_defaults() {
        let config: MonitorConfig = toml::from_str(
            r#"
            [database]
            url = "postgresql://localhost/trunkr_test"

            [window]
            units_limit = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.database.url, "postgresql://localhost/trunkr_test");
        assert_eq!(config.window.units_limit, 250);
        assert_eq!(config.window.calls_limit, 50);
        assert_eq!(config.polling.listen_max_wait_ms, 500);
        assert_eq!(config.store.calls_table, "calls_metadata");
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = MonitorConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: MonitorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.window.active_window_seconds, 180);
        assert_eq!(parsed.service.name, config.service.name);
    }

    #[tokio::test]
    async fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[polling]\ntick_interval_ms = 250\n\n[service]\nname = \"lab-monitor\""
        )
        .unwrap();

        let config = MonitorConfig::from_file(file.path()).await.unwrap();
        assert_eq!(config.polling.tick_interval(), Duration::from_millis(250));
        assert_eq!(config.service.name, "lab-monitor");
    }

    #[tokio::test]
    async fn test_from_file_missing() {
        let result = MonitorConfig::from_file(Path::new("/nonexistent/trunkr.toml")).await;
        assert!(matches!(
            result,
            Err(crate::MonitorError::Configuration { .. })
        ));
    }
}
