//! Main monitoring service implementation
//!
//! Wires the windowed state, the observer registry and the change notifier
//! together, and owns the lifecycle of the background tasks.

use crate::{
    MonitorError, Result,
    config::MonitorConfig,
    health::{HealthStatus, StreamHealth, is_data_fresh},
    notifier::{ChangeNotifier, StreamMode},
    observer::{ObserverId, ObserverRegistry, StateObserver},
    reconcile::reconcile_active,
    state::WindowedState,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::{
    sync::{Notify, broadcast},
    task::JoinHandle,
    time::Instant,
};
use tracing::{error, info, instrument, warn};
use trunkr_core::{
    ActiveCallSession, Clock, CompletedCallRecord, StateSnapshot, StreamKind, SystemClock,
    UnitActivityEvent,
};
use trunkr_database::{EventStore, PgEventStore};

/// Task handles type alias
type TaskHandles = Arc<RwLock<Vec<JoinHandle<()>>>>;

/// Service status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Service is stopped
    #[default]
    Stopped,

    /// Service is starting up
    Starting,

    /// Service is running normally
    Running,

    /// Service is shutting down
    Stopping,

    /// Service failed to start
    Failed {
        /// Reason for failure
        reason: String,
    },
}

/// Live monitor over the event store
#[derive(Debug)]
pub struct MonitorService {
    /// Service configuration
    config: MonitorConfig,

    /// Event store shared with the state and the notifier
    store: Arc<dyn EventStore>,

    /// Cached views
    state: Arc<WindowedState>,

    /// Registered observers
    observers: Arc<ObserverRegistry>,

    /// Push listeners and fallback poller
    notifier: ChangeNotifier,

    /// Cleared when shutdown begins; gates observer dispatch
    running: Arc<AtomicBool>,

    /// Running task handles
    task_handles: TaskHandles,

    /// Shutdown signal
    shutdown_notify: Arc<Notify>,

    /// Shutdown sender (for broadcasting shutdown)
    shutdown_tx: broadcast::Sender<()>,

    /// Service status
    status: Arc<RwLock<ServiceStatus>>,

    /// Service start time
    start_time: Arc<RwLock<Option<Instant>>>,
}

impl MonitorService {
    /// Create a service backed by `PostgreSQL`
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] if:
    /// - The configuration is invalid
    /// - The connection pool cannot be created
    pub async fn new(config: MonitorConfig) -> Result<Self> {
        info!("Initializing monitor service");
        config.validate()?;

        let store = PgEventStore::connect(&config.database, config.store.clone()).await?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Create a service over any event store, using the wall clock
    #[must_use]
    pub fn with_store(config: MonitorConfig, store: Arc<dyn EventStore>) -> Self {
        Self::with_store_and_clock(config, store, Arc::new(SystemClock))
    }

    /// Create a service over any event store and clock
    #[must_use]
    pub fn with_store_and_clock(
        config: MonitorConfig,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = Arc::new(WindowedState::new(
            Arc::clone(&store),
            clock,
            config.window.clone(),
        ));
        let observers = Arc::new(ObserverRegistry::new());
        let running = Arc::new(AtomicBool::new(false));
        let notifier = ChangeNotifier::new(
            Arc::clone(&store),
            Arc::clone(&state),
            Arc::clone(&observers),
            config.polling.clone(),
            Arc::clone(&running),
        );

        // Create shutdown channel
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            state,
            observers,
            notifier,
            running,
            task_handles: Arc::new(RwLock::new(Vec::new())),
            shutdown_notify: Arc::new(Notify::new()),
            shutdown_tx,
            status: Arc::new(RwLock::new(ServiceStatus::Stopped)),
            start_time: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the monitor
    ///
    /// Checks connectivity, loads the caches once, chooses push or poll mode
    /// and spawns the background tasks. A failed initial load is logged and
    /// the caches start empty.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] if:
    /// - Service is already running
    /// - The event store is unreachable
    #[instrument(skip(self), fields(service = %self.config.service.name))]
    pub async fn start(&self) -> Result<()> {
        {
            let mut status = self.status.write();
            if !matches!(*status, ServiceStatus::Stopped | ServiceStatus::Failed { .. }) {
                return Err(MonitorError::ServiceAlreadyRunning);
            }
            *status = ServiceStatus::Starting;
        }

        info!("Starting monitor service");

        if let Err(e) = self.store.ping().await {
            error!(error = %e, "Event store unreachable");
            *self.status.write() = ServiceStatus::Failed {
                reason: e.to_string(),
            };
            return Err(e.into());
        }

        *self.start_time.write() = Some(Instant::now());
        self.running.store(true, Ordering::SeqCst);

        if let Err(e) = self.state.load_initial().await {
            warn!(operation = "initial_load", error = %e, "Initial load failed, starting empty");
        }

        let subscriptions = self.notifier.initialize().await;
        let handles = self.notifier.spawn(subscriptions, &self.shutdown_tx);
        self.task_handles.write().extend(handles);

        *self.status.write() = ServiceStatus::Running;

        info!(
            push_mode = self.notifier.modes().any_push(),
            active_calls = self.state.active_calls().len(),
            "Monitor service started"
        );

        Ok(())
    }

    /// Stop the monitor
    ///
    /// No observer is invoked once this returns. Tasks still running after
    /// the shutdown timeout are aborted.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for symmetry with [`Self::start`].
    #[instrument(skip(self), fields(service = %self.config.service.name))]
    pub async fn stop(&self) -> Result<()> {
        {
            let mut status = self.status.write();
            if *status == ServiceStatus::Stopped {
                return Ok(());
            }
            *status = ServiceStatus::Stopping;
        }

        info!("Stopping monitor service");

        // Send shutdown signal
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
        self.shutdown_notify.notify_waiters();

        let handles: Vec<JoinHandle<()>> = self.task_handles.write().drain(..).collect();
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        // Wait for tasks to complete with timeout
        let timeout_duration = self.config.service.shutdown_timeout();
        let shutdown_result = tokio::time::timeout(timeout_duration, async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background task ended abnormally");
                }
            }
        })
        .await;

        if shutdown_result.is_err() {
            warn!(
                timeout_seconds = timeout_duration.as_secs(),
                "Service shutdown timed out, aborting remaining tasks"
            );
            for abort in aborts {
                abort.abort();
            }
        }

        // Update status
        *self.status.write() = ServiceStatus::Stopped;
        *self.start_time.write() = None;

        info!("Monitor service stopped");
        Ok(())
    }

    /// Get service status
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        self.status.read().clone()
    }

    /// Time since [`Self::start`] succeeded
    #[must_use]
    pub fn uptime(&self) -> Option<std::time::Duration> {
        let start_time = *self.start_time.read();
        start_time.map(|at| at.elapsed())
    }

    /// Wait for shutdown signal
    pub async fn wait_for_shutdown(&self) {
        self.shutdown_notify.notified().await;
    }

    /// Register an observer
    ///
    /// The observer is invoked once with the current state before this
    /// returns, then after every committed refresh.
    pub fn register_observer<O>(&self, observer: O) -> ObserverId
    where
        O: StateObserver + 'static,
    {
        self.observers
            .register(Arc::new(observer), || self.state.snapshot())
    }

    /// Remove an observer; `false` when the id is unknown
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Active sessions as derived from unit activity
    #[must_use]
    pub fn active_calls(&self) -> Vec<ActiveCallSession> {
        self.state.active_calls()
    }

    /// Active sessions not yet superseded by a completed call
    #[must_use]
    pub fn reconciled_active_calls(&self) -> Vec<ActiveCallSession> {
        let snapshot = self.state.snapshot();
        reconcile_active(&snapshot.active_calls, &snapshot.recent_calls)
    }

    /// Recent completed calls, newest first
    #[must_use]
    pub fn recent_calls(&self) -> Vec<CompletedCallRecord> {
        self.state.recent_calls()
    }

    /// Recent unit activity, newest first
    #[must_use]
    pub fn recent_units(&self) -> Vec<UnitActivityEvent> {
        self.state.recent_units()
    }

    /// Copy of all cached views
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    /// Mode of each stream
    #[must_use]
    pub fn stream_modes(&self) -> Vec<(StreamKind, StreamMode)> {
        self.notifier.modes().all()
    }

    /// Current health
    ///
    /// Queries the store for the newest unit timestamp. A failing store
    /// reports stale data rather than an error.
    pub async fn health_status(&self) -> HealthStatus {
        let newest_unit_timestamp = match self.store.latest_unit_timestamp().await {
            Ok(timestamp) => timestamp,
            Err(e) => {
                warn!(operation = "health", error = %e, "Failed to read newest unit timestamp");
                None
            }
        };

        let modes = self.notifier.modes();
        HealthStatus {
            status: self.status(),
            push_mode: modes.any_push(),
            streams: modes
                .all()
                .into_iter()
                .map(|(stream, mode)| StreamHealth { stream, mode })
                .collect(),
            last_refresh_age: self.state.last_refresh_age(),
            newest_unit_timestamp,
            data_fresh: is_data_fresh(
                newest_unit_timestamp,
                self.state.now(),
                self.config.window.freshness_threshold(),
            ),
            refreshed_at: self.state.refreshed_at(),
        }
    }

    /// Service configuration
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

impl Drop for MonitorService {
    fn drop(&mut self) {
        // Ensure service is stopped when dropped
        if !matches!(*self.status.read(), ServiceStatus::Stopped) {
            warn!("MonitorService dropped while still running");
            self.running.store(false, Ordering::SeqCst);
            let _ = self.shutdown_tx.send(());
        }
    }
}
