//! End-to-end behavior of the monitor over the in-memory store
#![forbid(unsafe_code)]

mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::time::Duration;
use trunkr_core::StateSnapshot;
use trunkr_database::MemoryEventStore;
use trunkr_monitor::{MonitorError, Result, ServiceStatus};

#[tokio::test(start_paused = true)]
async fn test_talkgroup_session_until_completed_record() {
    let store = MemoryEventStore::new();
    store.upsert_talkgroup(talkgroup(1001, "Fire Dispatch"));
    let (service, _clock) = service_at(&store, 1010);
    let recorder = Recorder::default();
    recorder.register(&service);
    service.start().await.unwrap();

    store.insert_unit(call_event(1000, 5001, 1001));
    store.insert_unit(call_event(1005, 5002, 1001));
    store.insert_unit(call_event(1009, 5003, 1001));

    let seen = wait_until(Duration::from_secs(2), || {
        recorder
            .last()
            .and_then(|s| s.active_calls.first().cloned())
            .is_some_and(|session| session.latest_time == 1009)
    })
    .await;
    assert!(seen.is_some());

    let active = service.active_calls();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].talkgroup, 1001);
    assert_eq!(active[0].start_time, 1000);
    assert_eq!(active[0].initiating_unit, 5001);
    assert_eq!(active[0].alpha_tag.as_deref(), Some("Fire Dispatch"));
    assert_eq!(service.reconciled_active_calls().len(), 1);

    // Ends at 1008, after the session started at 1000
    store.insert_call(record(1001, 998, 10));
    let seen = wait_until(Duration::from_secs(2), || service.recent_calls().len() == 1).await;
    assert!(seen.is_some());

    assert_eq!(service.active_calls().len(), 1);
    assert!(service.reconciled_active_calls().is_empty());

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_earliest_unit_initiates_session() {
    let store = MemoryEventStore::new();
    store.insert_unit(call_event(500, 10, 2002));
    store.insert_unit(call_event(520, 20, 2002));
    let (service, _clock) = service_at(&store, 600);

    service.start().await.unwrap();

    let active = service.active_calls();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].talkgroup, 2002);
    assert_eq!(active[0].start_time, 500);
    assert_eq!(active[0].latest_time, 520);
    assert_eq!(active[0].initiating_unit, 10);
    assert_eq!(active[0].alpha_tag, None);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_registration_replays_current_state_once() {
    let store = MemoryEventStore::new();
    store.insert_unit(call_event(995, 5001, 1001));
    store.insert_call(record(3003, 900, 30));
    let (service, _clock) = service_at(&store, 1000);
    service.start().await.unwrap();

    let recorder = Recorder::default();
    recorder.register(&service);

    assert_eq!(recorder.count(), 1);
    let replayed = recorder.last().unwrap();
    assert_eq!(replayed.active_calls.len(), 1);
    assert_eq!(replayed.recent_calls.len(), 1);
    assert_eq!(replayed, service.snapshot());

    service.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failing_observers_do_not_block_others() {
    let store = MemoryEventStore::new();
    let (service, _clock) = service_at(&store, 1000);
    service.start().await.unwrap();

    service.register_observer(|_: &StateSnapshot| -> Result<()> {
        Err(MonitorError::observer("display closed"))
    });
    service.register_observer(|snapshot: &StateSnapshot| -> Result<()> {
        assert!(snapshot.active_calls.is_empty(), "renderer crashed");
        Ok(())
    });
    let recorder = Recorder::default();
    recorder.register(&service);

    store.insert_unit(call_event(998, 5001, 1001));
    let seen = wait_until(Duration::from_secs(2), || {
        recorder.last().is_some_and(|s| s.active_calls.len() == 1)
    })
    .await;

    assert!(seen.is_some());
    assert_eq!(service.status(), ServiceStatus::Running);
    service.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_dispatch_after_stop() {
    let store = MemoryEventStore::new();
    let (service, _clock) = service_at(&store, 1000);
    let recorder = Recorder::default();
    recorder.register(&service);
    service.start().await.unwrap();

    service.stop().await.unwrap();
    let after_stop = recorder.count();

    store.insert_unit(call_event(999, 5001, 1001));
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(recorder.count(), after_stop);
    assert_eq!(store.subscriber_count(trunkr_core::StreamKind::Units), 0);
    assert_eq!(store.subscriber_count(trunkr_core::StreamKind::Calls), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_commits_nothing_and_recovers() {
    let store = MemoryEventStore::new();
    let (service, _clock) = service_at(&store, 1000);
    let recorder = Recorder::default();
    recorder.register(&service);
    service.start().await.unwrap();

    store.set_lookups_fail(true);
    store.insert_unit(call_event(999, 5001, 1001));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(service.active_calls().is_empty());
    assert!(
        recorder
            .last()
            .is_some_and(|s| s.active_calls.is_empty())
    );

    // Poller picks the row up again once lookups work
    store.set_lookups_fail(false);
    let seen = wait_until(Duration::from_secs(3), || service.active_calls().len() == 1).await;
    assert!(seen.is_some());

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_health_reports_stale_data() {
    let store = MemoryEventStore::new();
    store.insert_unit(call_event(985, 5001, 1001));
    let (service, clock) = service_at(&store, 1000);
    service.start().await.unwrap();

    let health = service.health_status().await;
    assert!(!health.data_fresh);
    assert_eq!(health.newest_unit_timestamp, Some(985));
    assert!(!health.is_healthy());

    clock.set(995);
    assert!(!service.health_status().await.data_fresh);

    clock.set(990);
    assert!(service.health_status().await.data_fresh);

    service.stop().await.unwrap();
}
