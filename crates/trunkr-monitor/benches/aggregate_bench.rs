//! Benchmarks for session derivation and reconciliation

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use tokio::runtime::Runtime;
use trunkr_core::{CompletedCallRecord, ManualClock, UnitAction, UnitActivityEvent};
use trunkr_database::MemoryEventStore;
use trunkr_monitor::{WindowConfig, WindowedState, derive_active_sessions, reconcile_active};

const NOW: i64 = 100_000;

/// Newest-first unit window spread over `talkgroups` talkgroups
fn units(count: usize, talkgroups: i32) -> Vec<UnitActivityEvent> {
    (0..count)
        .map(|i| {
            let i = i64::try_from(i).unwrap();
            UnitActivityEvent {
                id: Some(i),
                timestamp: NOW - i % 300,
                radio_id: 1_000_000 + i,
                action: if i % 3 == 0 {
                    UnitAction::Join
                } else {
                    UnitAction::Call
                },
                talkgroup: Some(i32::try_from(i).unwrap() % talkgroups),
                source: None,
            }
        })
        .collect()
}

fn calls(count: usize, talkgroups: i32) -> Vec<CompletedCallRecord> {
    (0..count)
        .map(|i| {
            let i = i64::try_from(i).unwrap();
            CompletedCallRecord {
                id: Some(i),
                talkgroup: i32::try_from(i).unwrap() % talkgroups,
                start_time: NOW - 200 + i,
                call_length: Some(12),
                transcription: None,
                talkgroup_description: None,
                src_list: Vec::new(),
            }
        })
        .collect()
}

/// Benchmark deriving sessions from unit windows of different sizes
fn bench_derive_sessions(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive_active_sessions");

    for size in [100usize, 1_000, 10_000] {
        let window = units(size, 40);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &window, |b, window| {
            b.iter(|| derive_active_sessions(black_box(window), black_box(NOW), 180));
        });
    }

    group.finish();
}

/// Benchmark filtering sessions against completed calls
fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_active");

    let active = derive_active_sessions(&units(1_000, 200), NOW, 180);
    for size in [50usize, 500] {
        let recent = calls(size, 200);
        group.bench_with_input(BenchmarkId::from_parameter(size), &recent, |b, recent| {
            b.iter(|| reconcile_active(black_box(&active), black_box(recent)));
        });
    }

    group.finish();
}

/// Benchmark a full unit refresh against the in-memory store
fn bench_refresh_units(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = MemoryEventStore::poll_only();
    for event in units(2_000, 40) {
        store.insert_unit(event);
    }
    let state = WindowedState::new(
        Arc::new(store),
        Arc::new(ManualClock::new(NOW)),
        WindowConfig::default(),
    );

    c.bench_function("refresh_units", |b| {
        b.to_async(&rt)
            .iter(|| async { state.refresh_units(true).await.unwrap() });
    });
}

criterion_group!(
    benches,
    bench_derive_sessions,
    bench_reconcile,
    bench_refresh_units
);
criterion_main!(benches);
