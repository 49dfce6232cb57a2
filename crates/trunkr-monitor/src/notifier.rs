//! Change notification manager
//!
//! Each stream is followed by a push listener while the store can push, and
//! a fallback poller runs for the whole life of the service. The poller only
//! queries a push stream after a quiet period without push signals; streams
//! that lost push are polled on every tick.

use crate::Result;
use crate::config::PollingConfig;
use crate::observer::ObserverRegistry;
use crate::state::WindowedState;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trunkr_core::StreamKind;
use trunkr_database::{ChangeEvent, ChangeSubscription, EventStore};

/// Delivery mode of one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Not initialized yet
    #[default]
    Unstarted,
    /// Live subscription open
    PushActive,
    /// Live subscription broken, reopening
    PushReconnecting,
    /// Push abandoned for the rest of the process; poller only
    PollOnly,
}

/// Inputs to the [`StreamMode`] state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    /// A subscription was opened or reopened
    SubscriptionOpened,
    /// The live subscription failed
    SubscriptionFailed,
    /// Reopening failed while the store still reports push support
    ReopenFailed,
    /// The store cannot push
    PushUnavailable,
}

impl StreamMode {
    /// Next mode after `event`
    ///
    /// `PollOnly` absorbs every event.
    #[must_use]
    pub const fn transition(self, event: ModeEvent) -> Self {
        match (self, event) {
            (Self::PollOnly, _) | (_, ModeEvent::PushUnavailable) => Self::PollOnly,
            (Self::Unstarted | Self::PushReconnecting, ModeEvent::SubscriptionOpened) => {
                Self::PushActive
            }
            (
                Self::PushActive | Self::PushReconnecting,
                ModeEvent::SubscriptionFailed | ModeEvent::ReopenFailed,
            ) => Self::PushReconnecting,
            (mode, _) => mode,
        }
    }

    /// Whether the stream is served by a push listener
    #[must_use]
    pub const fn is_push(self) -> bool {
        matches!(self, Self::PushActive | Self::PushReconnecting)
    }

    /// Whether the poller must query this stream on every tick
    #[must_use]
    pub const fn polls_every_tick(self) -> bool {
        !matches!(self, Self::PushActive)
    }

    /// Mode name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::PushActive => "push_active",
            Self::PushReconnecting => "push_reconnecting",
            Self::PollOnly => "poll_only",
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn slot(stream: StreamKind) -> usize {
    match stream {
        StreamKind::Units => 0,
        StreamKind::Calls => 1,
    }
}

/// Current mode of each stream
#[derive(Debug, Default)]
pub struct StreamModes {
    modes: RwLock<[StreamMode; 2]>,
}

impl StreamModes {
    /// Mode of one stream
    #[must_use]
    pub fn get(&self, stream: StreamKind) -> StreamMode {
        self.modes.read()[slot(stream)]
    }

    /// Apply an event and return the resulting mode
    pub fn apply(&self, stream: StreamKind, event: ModeEvent) -> StreamMode {
        let mut modes = self.modes.write();
        let from = modes[slot(stream)];
        let to = from.transition(event);
        modes[slot(stream)] = to;
        drop(modes);

        if from != to {
            info!(%stream, %from, %to, ?event, "Stream mode changed");
        }
        to
    }

    /// Modes of all streams, units first
    #[must_use]
    pub fn all(&self) -> Vec<(StreamKind, StreamMode)> {
        let modes = *self.modes.read();
        StreamKind::ALL
            .into_iter()
            .map(|stream| (stream, modes[slot(stream)]))
            .collect()
    }

    /// Whether any stream is still served by push
    #[must_use]
    pub fn any_push(&self) -> bool {
        self.modes.read().iter().any(|mode| mode.is_push())
    }
}

enum Reopen {
    Opened(Box<dyn ChangeSubscription>),
    Retry,
    Abandoned,
}

/// Drives refreshes from push signals and polling
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    store: Arc<dyn EventStore>,
    state: Arc<WindowedState>,
    observers: Arc<ObserverRegistry>,
    modes: Arc<StreamModes>,
    polling: PollingConfig,
    running: Arc<AtomicBool>,
}

impl ChangeNotifier {
    /// Create a notifier; nothing runs until [`Self::initialize`] and [`Self::spawn`]
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        state: Arc<WindowedState>,
        observers: Arc<ObserverRegistry>,
        polling: PollingConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            state,
            observers,
            modes: Arc::new(StreamModes::default()),
            polling,
            running,
        }
    }

    /// Stream modes
    #[must_use]
    pub fn modes(&self) -> &StreamModes {
        &self.modes
    }

    /// Probe push support and open one subscription per stream
    ///
    /// Returns no subscriptions when push is unavailable. A failed probe or
    /// any failed open puts every stream in poll-only mode.
    pub async fn initialize(&self) -> Vec<Box<dyn ChangeSubscription>> {
        let supported = match self.store.supports_push().await {
            Ok(supported) => supported,
            Err(e) => {
                warn!(error = %e, "Push capability probe failed");
                false
            }
        };

        if !supported {
            info!("Change notifications unavailable, running in poll-only mode");
            self.all_poll_only();
            return Vec::new();
        }

        let mut subscriptions = Vec::with_capacity(StreamKind::ALL.len());
        for stream in StreamKind::ALL {
            match self.store.watch(stream).await {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => {
                    warn!(%stream, error = %e, "Failed to open change subscription, falling back to polling");
                    self.all_poll_only();
                    return Vec::new();
                }
            }
        }

        for stream in StreamKind::ALL {
            self.modes.apply(stream, ModeEvent::SubscriptionOpened);
        }
        info!("Change notifications active");
        subscriptions
    }

    fn all_poll_only(&self) {
        for stream in StreamKind::ALL {
            self.modes.apply(stream, ModeEvent::PushUnavailable);
        }
    }

    /// Spawn one listener per subscription and the fallback poller
    #[must_use]
    pub fn spawn(
        &self,
        subscriptions: Vec<Box<dyn ChangeSubscription>>,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles: Vec<JoinHandle<()>> = subscriptions
            .into_iter()
            .map(|subscription| {
                let notifier = self.clone();
                let shutdown_rx = shutdown_tx.subscribe();
                tokio::spawn(async move {
                    notifier.run_push_listener(subscription, shutdown_rx).await;
                })
            })
            .collect();

        let notifier = self.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            notifier.run_poller(shutdown_rx).await;
        }));

        handles
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Notify observers with the committed state, unless shutting down
    fn dispatch(&self) {
        if !self.is_running() {
            debug!("Skipping observer dispatch during shutdown");
            return;
        }
        let snapshot = self.state.snapshot();
        let failures = self.observers.notify_all(&snapshot);
        debug!(
            observers = self.observers.len(),
            failures,
            active_calls = snapshot.active_calls.len(),
            "Dispatched state update"
        );
    }

    async fn refresh_stream(&self, stream: StreamKind, recompute_active: bool) -> Result<()> {
        match stream {
            StreamKind::Units => self.state.refresh_units(recompute_active).await,
            StreamKind::Calls => self.state.refresh_calls().await,
        }
    }

    /// React to one push-delivered change
    ///
    /// Every change stamps the refresh time. Inserts and updates refresh
    /// their stream and dispatch once; unit changes rebuild the active
    /// sessions only for `call` actions.
    pub async fn handle_change(&self, stream: StreamKind, change: &ChangeEvent) {
        self.state.mark_refresh();

        if !change.operation.is_insert_or_update() {
            debug!(%stream, operation = ?change.operation, "Ignoring change");
            return;
        }

        let recompute_active = stream == StreamKind::Units && change.is_call_action();
        match self.refresh_stream(stream, recompute_active).await {
            Ok(()) => self.dispatch(),
            Err(e) => {
                warn!(%stream, operation = "push_refresh", error = %e, "Refresh failed, skipping cycle");
            }
        }
    }

    async fn run_push_listener(
        &self,
        subscription: Box<dyn ChangeSubscription>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let stream = subscription.stream();
        let max_wait = self.polling.listen_max_wait();
        let mut current = Some(subscription);
        debug!(%stream, "Push listener started");

        while self.is_running() {
            // A failed subscription is dropped and reopened before reading again
            let Some(mut subscription) = current.take() else {
                match self.reopen(stream).await {
                    Reopen::Opened(reopened) => current = Some(reopened),
                    Reopen::Retry => {
                        if sleep_or_shutdown(self.polling.error_backoff(), &mut shutdown_rx).await
                        {
                            break;
                        }
                    }
                    Reopen::Abandoned => break,
                }
                continue;
            };

            let next = tokio::select! {
                result = subscription.next_change(max_wait) => result,
                _ = shutdown_rx.recv() => break,
            };

            match next {
                Ok(None) => current = Some(subscription),
                Ok(Some(change)) => {
                    self.handle_change(stream, &change).await;
                    current = Some(subscription);
                }
                Err(e) => {
                    self.modes.apply(stream, ModeEvent::SubscriptionFailed);
                    warn!(%stream, error = %e, "Change subscription failed, reconnecting");
                }
            }
        }

        debug!(%stream, mode = %self.modes.get(stream), "Push listener stopped");
    }

    async fn reopen(&self, stream: StreamKind) -> Reopen {
        let error = match self.store.watch(stream).await {
            Ok(subscription) => {
                self.modes.apply(stream, ModeEvent::SubscriptionOpened);
                info!(%stream, "Change subscription reopened");
                return Reopen::Opened(subscription);
            }
            Err(e) => e,
        };

        match self.store.supports_push().await {
            Ok(false) => {
                self.modes.apply(stream, ModeEvent::PushUnavailable);
                warn!(%stream, error = %error, "Push no longer supported, polling this stream");
                Reopen::Abandoned
            }
            probe => {
                if let Err(probe_error) = probe {
                    debug!(%stream, error = %probe_error, "Push capability probe failed");
                }
                self.modes.apply(stream, ModeEvent::ReopenFailed);
                warn!(%stream, error = %error, "Reopening change subscription failed");
                Reopen::Retry
            }
        }
    }

    async fn run_poller(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        debug!("Fallback poller started");

        while self.is_running() {
            let pause = match self.poll_once().await {
                Ok(_) => self.polling.tick_interval(),
                Err(e) => {
                    warn!(operation = "poll", error = %e, "Polling pass failed");
                    self.polling.error_backoff()
                }
            };

            if sleep_or_shutdown(pause, &mut shutdown_rx).await {
                break;
            }
        }

        debug!("Fallback poller stopped");
    }

    /// Run one polling pass and return the streams that were refreshed
    ///
    /// A stream is probed for rows newer than the probe window when it is not
    /// push-active, or when no push signal arrived during the quiet period.
    /// Each stream with new rows is refreshed and dispatched once.
    ///
    /// # Errors
    ///
    /// Returns the first store error; later streams are skipped for this pass.
    pub async fn poll_once(&self) -> Result<Vec<StreamKind>> {
        let quiet = self
            .state
            .last_refresh_age()
            .is_none_or(|age| age >= self.polling.push_quiet_period());
        let since = self
            .state
            .now()
            .saturating_sub(self.polling.probe_window());

        let mut refreshed = Vec::new();
        for stream in StreamKind::ALL {
            if !quiet && !self.modes.get(stream).polls_every_tick() {
                continue;
            }

            let has_new = match stream {
                StreamKind::Units => !self.store.recent_units(since, Some(1)).await?.is_empty(),
                StreamKind::Calls => !self.store.recent_calls(since, Some(1)).await?.is_empty(),
            };
            if has_new {
                debug!(%stream, "Poller found new rows");
                self.refresh_stream(stream, true).await?;
                self.dispatch();
                refreshed.push(stream);
            }
        }

        if quiet {
            self.state.mark_refresh();
        }
        Ok(refreshed)
    }
}

/// Sleep for `duration`; `true` when shutdown arrived first
async fn sleep_or_shutdown(duration: Duration, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        _ = shutdown_rx.recv() => true,
    }
}
