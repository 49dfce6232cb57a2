//! Windowed state aggregator
//!
//! Owns the recent unit activity cache, the recent completed call cache and
//! the active session set. Refreshes serialize on one async gate that is held
//! across the store queries and the commit. The caches, the session set and
//! the last refresh instant sit behind a single lock and a refresh is applied
//! in one write, so readers never observe a partially applied refresh.

use crate::Result;
use crate::config::WindowConfig;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use trunkr_core::{
    ActiveCallSession, Clock, CompletedCallRecord, StateSnapshot, TalkgroupId, UnitActivityEvent,
    UnixSeconds,
};
use trunkr_database::EventStore;

/// Derive active sessions from a unit activity window
///
/// Keeps `call` events with a talkgroup and `timestamp >= now - active_window`,
/// groups them by talkgroup and takes the earliest and latest timestamps. The
/// initiating unit is the first event in `units` carrying the earliest
/// timestamp. Alpha tags are left empty.
///
/// The result is sorted by talkgroup ascending, then start time descending.
#[must_use]
pub fn derive_active_sessions(
    units: &[UnitActivityEvent],
    now: UnixSeconds,
    active_window: i64,
) -> Vec<ActiveCallSession> {
    let cutoff = now.saturating_sub(active_window);
    let mut sessions: BTreeMap<TalkgroupId, ActiveCallSession> = BTreeMap::new();

    for event in units {
        if !event.action.is_call() || event.timestamp < cutoff {
            continue;
        }
        let Some(talkgroup) = event.talkgroup else {
            continue;
        };

        sessions
            .entry(talkgroup)
            .and_modify(|session| {
                if event.timestamp < session.start_time {
                    session.start_time = event.timestamp;
                    session.initiating_unit = event.radio_id;
                }
                session.latest_time = session.latest_time.max(event.timestamp);
            })
            .or_insert_with(|| ActiveCallSession {
                talkgroup,
                start_time: event.timestamp,
                latest_time: event.timestamp,
                initiating_unit: event.radio_id,
                alpha_tag: None,
            });
    }

    let mut sessions: Vec<_> = sessions.into_values().collect();
    sort_sessions(&mut sessions);
    sessions
}

fn sort_sessions(sessions: &mut [ActiveCallSession]) {
    sessions.sort_by(|a, b| {
        a.talkgroup
            .cmp(&b.talkgroup)
            .then(b.start_time.cmp(&a.start_time))
    });
}

#[derive(Debug, Default)]
struct Committed {
    view: StateSnapshot,
    last_refresh: Option<Instant>,
}

/// Cached views over the trailing windows of the event store
#[derive(Debug)]
pub struct WindowedState {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    window: WindowConfig,
    refresh_gate: tokio::sync::Mutex<()>,
    committed: RwLock<Committed>,
}

impl WindowedState {
    /// Create an empty aggregator
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>, window: WindowConfig) -> Self {
        Self {
            store,
            clock,
            window,
            refresh_gate: tokio::sync::Mutex::new(()),
            committed: RwLock::new(Committed::default()),
        }
    }

    /// Fill both caches and the session set
    ///
    /// # Errors
    ///
    /// Returns the first store error; whatever refreshed before it stays
    /// committed.
    pub async fn load_initial(&self) -> Result<()> {
        self.refresh_units(true).await?;
        self.refresh_calls().await
    }

    /// Replace the recent unit activity cache
    ///
    /// With `recompute_active` the session set is rebuilt from the new cache,
    /// including alpha tag lookups.
    ///
    /// # Errors
    ///
    /// Returns the store error. Nothing is committed in that case.
    pub async fn refresh_units(&self, recompute_active: bool) -> Result<()> {
        let _gate = self.refresh_gate.lock().await;
        let now = self.clock.now();

        let units = self
            .store
            .recent_units(
                now.saturating_sub(self.window.units_window()),
                Some(self.window.units_limit),
            )
            .await?;

        let active = if recompute_active {
            let sessions = derive_active_sessions(&units, now, self.window.active_window());
            Some(self.resolve_alpha_tags(sessions).await?)
        } else {
            None
        };

        let mut committed = self.committed.write();
        let view = &mut committed.view;
        view.recent_units = units;
        if let Some(active) = active {
            view.active_calls = active;
        }
        view.refreshed_at = Some(now);
        debug!(
            recent_units = view.recent_units.len(),
            active_calls = view.active_calls.len(),
            recompute_active,
            "Refreshed unit activity"
        );
        drop(committed);

        Ok(())
    }

    /// Replace the recent completed call cache
    ///
    /// # Errors
    ///
    /// Returns the store error. Nothing is committed in that case.
    pub async fn refresh_calls(&self) -> Result<()> {
        let _gate = self.refresh_gate.lock().await;
        let now = self.clock.now();

        let calls = self
            .store
            .recent_calls(
                now.saturating_sub(self.window.calls_window()),
                Some(self.window.calls_limit),
            )
            .await?;

        let mut committed = self.committed.write();
        committed.view.recent_calls = calls;
        committed.view.refreshed_at = Some(now);
        debug!(
            recent_calls = committed.view.recent_calls.len(),
            "Refreshed completed calls"
        );
        drop(committed);

        Ok(())
    }

    async fn resolve_alpha_tags(
        &self,
        mut sessions: Vec<ActiveCallSession>,
    ) -> Result<Vec<ActiveCallSession>> {
        // TODO: cache alpha tags per talkgroup once reference data gets a change channel
        for session in &mut sessions {
            session.alpha_tag = self
                .store
                .talkgroup(session.talkgroup)
                .await?
                .and_then(|info| info.alpha_tag);
        }
        Ok(sessions)
    }

    /// Record that a change signal just arrived
    pub fn mark_refresh(&self) {
        self.committed.write().last_refresh = Some(Instant::now());
    }

    /// Time since the last change signal or polling pass
    #[must_use]
    pub fn last_refresh_age(&self) -> Option<Duration> {
        let last_refresh = self.committed.read().last_refresh;
        last_refresh.map(|at| at.elapsed())
    }

    /// Active sessions sorted by talkgroup, then start time descending
    #[must_use]
    pub fn active_calls(&self) -> Vec<ActiveCallSession> {
        self.committed.read().view.active_calls.clone()
    }

    /// Recent completed calls, newest first
    #[must_use]
    pub fn recent_calls(&self) -> Vec<CompletedCallRecord> {
        self.committed.read().view.recent_calls.clone()
    }

    /// Recent unit activity, newest first
    #[must_use]
    pub fn recent_units(&self) -> Vec<UnitActivityEvent> {
        self.committed.read().view.recent_units.clone()
    }

    /// Copy of all committed views
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.committed.read().view.clone()
    }

    /// Wall-clock time of the last committed refresh
    #[must_use]
    pub fn refreshed_at(&self) -> Option<UnixSeconds> {
        self.committed.read().view.refreshed_at
    }

    /// Current time according to the aggregator's clock
    #[must_use]
    pub fn now(&self) -> UnixSeconds {
        self.clock.now()
    }
}
