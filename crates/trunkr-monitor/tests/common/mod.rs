//! Shared fixtures for monitor integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use trunkr_core::{
    CompletedCallRecord, ManualClock, StateSnapshot, TalkgroupInfo, UnitAction, UnitActivityEvent,
};
use trunkr_database::MemoryEventStore;
use trunkr_monitor::{MonitorConfig, MonitorService, Result};

/// Unit event with a talkgroup
pub fn unit(timestamp: i64, radio_id: i64, action: UnitAction, talkgroup: i32) -> UnitActivityEvent {
    UnitActivityEvent {
        id: None,
        timestamp,
        radio_id,
        action,
        talkgroup: Some(talkgroup),
        source: None,
    }
}

/// `call` unit event
pub fn call_event(timestamp: i64, radio_id: i64, talkgroup: i32) -> UnitActivityEvent {
    unit(timestamp, radio_id, UnitAction::Call, talkgroup)
}

/// Completed call record with a transcription
pub fn record(talkgroup: i32, start_time: i64, call_length: i64) -> CompletedCallRecord {
    CompletedCallRecord {
        id: None,
        talkgroup,
        start_time,
        call_length: Some(call_length),
        transcription: Some("units responding".to_string()),
        talkgroup_description: None,
        src_list: Vec::new(),
    }
}

/// Talkgroup reference row
pub fn talkgroup(decimal: i32, alpha_tag: &str) -> TalkgroupInfo {
    TalkgroupInfo {
        decimal,
        alpha_tag: Some(alpha_tag.to_string()),
        description: None,
    }
}

/// Service over `store` with a clock frozen at `now`
pub fn service_at(store: &MemoryEventStore, now: i64) -> (MonitorService, ManualClock) {
    let clock = ManualClock::new(now);
    let service = MonitorService::with_store_and_clock(
        MonitorConfig::default(),
        Arc::new(store.clone()),
        Arc::new(clock.clone()),
    );
    (service, clock)
}

/// Observer that records every snapshot it receives
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<StateSnapshot>>>,
}

impl Recorder {
    pub fn register(&self, service: &MonitorService) -> trunkr_monitor::ObserverId {
        let seen = Arc::clone(&self.seen);
        service.register_observer(move |snapshot: &StateSnapshot| -> Result<()> {
            seen.lock().push(snapshot.clone());
            Ok(())
        })
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn last(&self) -> Option<StateSnapshot> {
        self.seen.lock().last().cloned()
    }
}

/// Poll `condition` every 10 ms until it holds or `limit` elapses
///
/// Returns how long it took.
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> Option<Duration>
where
    F: FnMut() -> bool,
{
    let started = Instant::now();
    loop {
        if condition() {
            return Some(started.elapsed());
        }
        if started.elapsed() >= limit {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
