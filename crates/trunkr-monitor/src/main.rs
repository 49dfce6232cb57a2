//! `trunkr` live monitor
//!
//! Follows unit activity and completed calls in the event store and reports
//! which talkgroups are currently transmitting.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use trunkr_core::utils::{format_clock_time, format_elapsed};
use trunkr_core::{Clock, LogGuard, StateSnapshot, SystemClock, UnixSeconds};
use trunkr_monitor::{MonitorConfig, MonitorError, MonitorService, Result, reconcile_active};

/// Command line interface for the `trunkr` monitor
#[derive(Parser)]
#[command(
    name = "trunkr-monitor",
    version = env!("CARGO_PKG_VERSION"),
    about = "Live monitor for radio trunking activity",
    long_about = "Follows unit activity and completed calls in PostgreSQL, using LISTEN/NOTIFY when available and polling otherwise, and shows which talkgroups are currently transmitting."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format (json, pretty); overrides the config file
    #[arg(long)]
    log_format: Option<String>,

    /// Enable structured JSON logging
    #[arg(long)]
    json: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Run the monitor until Ctrl+C
    Run {
        /// Print a plain-text snapshot on every update
        #[arg(short, long)]
        print: bool,
    },

    /// Connect, load once and print health as JSON
    Status,

    /// Inspect configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,
    },
}

/// Main entry point for the monitor
///
/// # Errors
///
/// Returns error if configuration, logging or the service fails
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (for development convenience)
    if let Err(e) = dotenvy::dotenv() {
        // It's okay if .env doesn't exist
        eprintln!("Note: .env file not loaded: {e}");
    }

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).await?;
    let _log_guard = init_logging(&cli, &mut config)?;

    match cli.command {
        Some(Commands::Run { print }) => run(config, print).await,
        Some(Commands::Status) => show_status(config).await,
        Some(Commands::Config { show }) => handle_config_command(&config, show),
        None => run(config, false).await,
    }
}

/// Apply CLI overrides and install the global subscriber
///
/// # Errors
///
/// Returns error if a subscriber is already installed
fn init_logging(cli: &Cli, config: &mut MonitorConfig) -> Result<Option<LogGuard>> {
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = &cli.log_format {
        config.logging.format.clone_from(format);
    }
    if cli.json {
        config.logging.format = "json".to_string();
    }

    let guard = trunkr_core::init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.logging.level,
        config_file = ?cli.config,
        "trunkr monitor starting"
    );
    Ok(guard)
}

/// Load configuration from file or environment
///
/// # Errors
///
/// Returns error if the configuration cannot be read, parsed or validated
async fn load_config(config_path: Option<&std::path::Path>) -> Result<MonitorConfig> {
    match config_path {
        Some(path) => MonitorConfig::from_file(path).await,
        None => MonitorConfig::load(),
    }
}

/// Run the monitor and wait for shutdown
///
/// # Errors
///
/// Returns error if the service cannot be created or started
async fn run(config: MonitorConfig, print: bool) -> Result<()> {
    info!(
        service = %config.service.name,
        active_window_seconds = config.window.active_window_seconds,
        "Starting monitor"
    );

    let service = MonitorService::new(config).await?;

    if print {
        service.register_observer(|snapshot: &StateSnapshot| -> Result<()> {
            println!("{}", render_snapshot(snapshot, SystemClock.now()));
            Ok(())
        });
    } else {
        service.register_observer(|snapshot: &StateSnapshot| -> Result<()> {
            info!(
                active_calls = snapshot.active_calls.len(),
                recent_calls = snapshot.recent_calls.len(),
                recent_units = snapshot.recent_units.len(),
                "State updated"
            );
            Ok(())
        });
    }

    service.start().await?;
    info!("Monitor is running. Press Ctrl+C to stop.");

    wait_for_shutdown_signal(&service).await;

    service.stop().await?;
    info!("Monitor stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or service shutdown)
async fn wait_for_shutdown_signal(service: &MonitorService) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully");
        }
        () = service.wait_for_shutdown() => {
            info!("Service requested shutdown");
        }
    }
}

/// Print health as JSON
///
/// # Errors
///
/// Returns error if the store is unreachable
async fn show_status(config: MonitorConfig) -> Result<()> {
    let service = MonitorService::new(config).await?;
    service.start().await?;
    let health = service.health_status().await;
    service.stop().await?;

    let json = serde_json::to_string_pretty(&health).map_err(|e| {
        MonitorError::configuration(format!("Failed to serialize health status: {e}"))
    })?;
    println!("{json}");
    Ok(())
}

/// Show configuration as TOML
///
/// # Errors
///
/// Returns error if configuration cannot be serialized
fn handle_config_command(config: &MonitorConfig, show: bool) -> Result<()> {
    if !show {
        println!("Configuration is valid");
        return Ok(());
    }

    let config_toml = toml::to_string_pretty(config).map_err(|e| {
        MonitorError::configuration(format!("Failed to serialize configuration: {e}"))
    })?;
    println!("{config_toml}");
    Ok(())
}

/// Rows shown in the active calls section
const MAX_ACTIVE_ROWS: usize = 15;

/// Plain-text view of a snapshot
fn render_snapshot(snapshot: &StateSnapshot, now: UnixSeconds) -> String {
    let mut out = String::new();
    let active = reconcile_active(&snapshot.active_calls, &snapshot.recent_calls);

    let _ = writeln!(out, "=== Active calls ({}) ===", active.len());
    for session in active.iter().take(MAX_ACTIVE_ROWS) {
        let _ = writeln!(
            out,
            "TG {:<6} {:<20} {:>8}  unit {}",
            session.talkgroup,
            session.alpha_tag.as_deref().unwrap_or("-"),
            format_elapsed(now - session.start_time),
            session.initiating_unit,
        );
    }

    let _ = writeln!(out, "=== Recent calls ({}) ===", snapshot.recent_calls.len());
    for call in &snapshot.recent_calls {
        let _ = writeln!(
            out,
            "{} TG {:<6} {:>4}s  {}",
            format_clock_time(call.start_time),
            call.talkgroup,
            call.call_length.unwrap_or(0),
            call.transcription.as_deref().unwrap_or("[encrypted]"),
        );
    }

    let _ = writeln!(out, "=== Unit activity ({}) ===", snapshot.recent_units.len());
    for unit in &snapshot.recent_units {
        let target = unit
            .talkgroup
            .map_or_else(|| "-".to_string(), |tg| format!("TG {tg}"));
        let _ = writeln!(
            out,
            "{} {:<10} {:<8} {}",
            format_clock_time(unit.timestamp),
            unit.radio_id,
            unit.action,
            target,
        );
    }

    out
}
