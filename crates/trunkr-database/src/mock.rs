//! In-memory event store for tests and demos
//!
//! Behaves like the `PostgreSQL` store: writes fan out to open subscriptions,
//! and failures can be injected per concern.

use crate::models::{ChangeDocument, ChangeEvent, OperationType};
use crate::store::{ChangeSubscription, EventStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use trunkr_core::{
    CompletedCallRecord, Error, Result, StreamKind, TalkgroupId, TalkgroupInfo, UnitActivityEvent,
    UnixSeconds,
};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Signal {
    Change(ChangeEvent),
    Break,
}

#[derive(Debug)]
struct Inner {
    units: RwLock<Vec<UnitActivityEvent>>,
    calls: RwLock<Vec<CompletedCallRecord>>,
    talkgroups: RwLock<HashMap<TalkgroupId, TalkgroupInfo>>,
    units_tx: broadcast::Sender<Signal>,
    calls_tx: broadcast::Sender<Signal>,
    next_id: AtomicI64,

    push_supported: AtomicBool,
    probe_fails: AtomicBool,
    watch_fails: AtomicBool,
    queries_fail: AtomicBool,
    lookups_fail: AtomicBool,

    query_count: AtomicUsize,
    lookup_count: AtomicUsize,
    watch_count: AtomicUsize,
}

impl Inner {
    const fn sender(&self, stream: StreamKind) -> &broadcast::Sender<Signal> {
        match stream {
            StreamKind::Units => &self.units_tx,
            StreamKind::Calls => &self.calls_tx,
        }
    }
}

/// Shared handle to an in-memory event store
///
/// Clones share the same data, so a test can keep one handle for writing
/// while the monitor owns another.
#[derive(Debug, Clone)]
pub struct MemoryEventStore {
    inner: Arc<Inner>,
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventStore {
    /// Create an empty store that supports push
    #[must_use]
    pub fn new() -> Self {
        let (units_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (calls_tx, _) = broadcast::channel(CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                units: RwLock::new(Vec::new()),
                calls: RwLock::new(Vec::new()),
                talkgroups: RwLock::new(HashMap::new()),
                units_tx,
                calls_tx,
                next_id: AtomicI64::new(1),
                push_supported: AtomicBool::new(true),
                probe_fails: AtomicBool::new(false),
                watch_fails: AtomicBool::new(false),
                queries_fail: AtomicBool::new(false),
                lookups_fail: AtomicBool::new(false),
                query_count: AtomicUsize::new(0),
                lookup_count: AtomicUsize::new(0),
                watch_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Create an empty store that cannot push
    #[must_use]
    pub fn poll_only() -> Self {
        let store = Self::new();
        store.set_push_supported(false);
        store
    }

    /// Append a unit event and notify subscribers
    pub fn insert_unit(&self, mut event: UnitActivityEvent) -> i64 {
        let id = *event
            .id
            .get_or_insert_with(|| self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner.units.write().push(event.clone());
        self.publish(StreamKind::Units, OperationType::Insert, ChangeDocument::Unit(event));
        id
    }

    /// Append a completed call and notify subscribers
    pub fn insert_call(&self, mut record: CompletedCallRecord) -> i64 {
        let id = *record
            .id
            .get_or_insert_with(|| self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner.calls.write().push(record.clone());
        self.publish(StreamKind::Calls, OperationType::Insert, ChangeDocument::Call(record));
        id
    }

    /// Insert or replace talkgroup reference data
    ///
    /// Reference data has no change stream.
    pub fn upsert_talkgroup(&self, info: TalkgroupInfo) {
        self.inner.talkgroups.write().insert(info.decimal, info);
    }

    /// Deliver an arbitrary change event to subscribers of its stream
    pub fn notify(&self, event: ChangeEvent) {
        // No receivers is fine
        let _ = self.inner.sender(event.stream).send(Signal::Change(event));
    }

    fn publish(&self, stream: StreamKind, operation: OperationType, document: ChangeDocument) {
        self.notify(ChangeEvent {
            stream,
            operation,
            full_document: Some(document),
        });
    }

    /// Break every open subscription, as a dropped connection would
    pub fn break_subscriptions(&self) {
        for stream in StreamKind::ALL {
            let _ = self.inner.sender(stream).send(Signal::Break);
        }
    }

    /// Whether `watch` can succeed and the probe reports push support
    pub fn set_push_supported(&self, supported: bool) {
        self.inner.push_supported.store(supported, Ordering::SeqCst);
    }

    /// Make the push-support probe return an error
    pub fn set_probe_fails(&self, fails: bool) {
        self.inner.probe_fails.store(fails, Ordering::SeqCst);
    }

    /// Make `watch` fail while push support is still reported
    pub fn set_watch_fails(&self, fails: bool) {
        self.inner.watch_fails.store(fails, Ordering::SeqCst);
    }

    /// Make window queries and `ping` fail
    pub fn set_queries_fail(&self, fails: bool) {
        self.inner.queries_fail.store(fails, Ordering::SeqCst);
    }

    /// Make talkgroup lookups fail
    pub fn set_lookups_fail(&self, fails: bool) {
        self.inner.lookups_fail.store(fails, Ordering::SeqCst);
    }

    /// Number of window queries served (units and calls)
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.inner.query_count.load(Ordering::SeqCst)
    }

    /// Number of talkgroup lookups served
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.inner.lookup_count.load(Ordering::SeqCst)
    }

    /// Number of successful `watch` calls
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.inner.watch_count.load(Ordering::SeqCst)
    }

    /// Number of currently open subscriptions on a stream
    #[must_use]
    pub fn subscriber_count(&self, stream: StreamKind) -> usize {
        self.inner.sender(stream).receiver_count()
    }

    fn check_queries(&self) -> Result<()> {
        if self.inner.queries_fail.load(Ordering::SeqCst) {
            return Err(Error::Database("injected query failure".to_string()));
        }
        Ok(())
    }
}

fn take_limit<T>(items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    match limit {
        Some(n) => items.into_iter().take(n).collect(),
        None => items,
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn ping(&self) -> Result<()> {
        self.check_queries()
    }

    async fn supports_push(&self) -> Result<bool> {
        if self.inner.probe_fails.load(Ordering::SeqCst) {
            return Err(Error::Database("injected probe failure".to_string()));
        }
        Ok(self.inner.push_supported.load(Ordering::SeqCst))
    }

    async fn recent_units(
        &self,
        since: UnixSeconds,
        limit: Option<usize>,
    ) -> Result<Vec<UnitActivityEvent>> {
        self.check_queries()?;
        self.inner.query_count.fetch_add(1, Ordering::SeqCst);

        let mut units: Vec<_> = self
            .inner
            .units
            .read()
            .iter()
            .filter(|u| u.timestamp >= since)
            .cloned()
            .collect();
        units.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(take_limit(units, limit))
    }

    async fn recent_calls(
        &self,
        since: UnixSeconds,
        limit: Option<usize>,
    ) -> Result<Vec<CompletedCallRecord>> {
        self.check_queries()?;
        self.inner.query_count.fetch_add(1, Ordering::SeqCst);

        let mut calls: Vec<_> = self
            .inner
            .calls
            .read()
            .iter()
            .filter(|c| c.start_time >= since)
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        Ok(take_limit(calls, limit))
    }

    async fn talkgroup(&self, decimal: TalkgroupId) -> Result<Option<TalkgroupInfo>> {
        if self.inner.lookups_fail.load(Ordering::SeqCst) {
            return Err(Error::Database("injected lookup failure".to_string()));
        }
        self.inner.lookup_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.talkgroups.read().get(&decimal).cloned())
    }

    async fn latest_unit_timestamp(&self) -> Result<Option<UnixSeconds>> {
        self.check_queries()?;
        Ok(self.inner.units.read().iter().map(|u| u.timestamp).max())
    }

    async fn watch(&self, stream: StreamKind) -> Result<Box<dyn ChangeSubscription>> {
        if !self.inner.push_supported.load(Ordering::SeqCst) {
            return Err(Error::subscription(
                stream.as_str(),
                "change notifications are not supported",
            ));
        }
        if self.inner.watch_fails.load(Ordering::SeqCst) {
            return Err(Error::subscription(stream.as_str(), "injected watch failure"));
        }

        self.inner.watch_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySubscription {
            stream,
            rx: self.inner.sender(stream).subscribe(),
        }))
    }
}

/// Subscription handed out by [`MemoryEventStore::watch`]
#[derive(Debug)]
pub struct MemorySubscription {
    stream: StreamKind,
    rx: broadcast::Receiver<Signal>,
}

#[async_trait]
impl ChangeSubscription for MemorySubscription {
    fn stream(&self) -> StreamKind {
        self.stream
    }

    async fn next_change(&mut self, max_wait: Duration) -> Result<Option<ChangeEvent>> {
        match tokio::time::timeout(max_wait, self.rx.recv()).await {
            Err(_) => Ok(None),
            Ok(Ok(Signal::Change(event))) => Ok(Some(event)),
            Ok(Ok(Signal::Break)) => Err(Error::subscription(
                self.stream.as_str(),
                "subscription broken",
            )),
            Ok(Err(broadcast::error::RecvError::Lagged(missed))) => Err(Error::subscription(
                self.stream.as_str(),
                format!("subscription lagged by {missed} changes"),
            )),
            Ok(Err(broadcast::error::RecvError::Closed)) => Err(Error::subscription(
                self.stream.as_str(),
                "subscription closed",
            )),
        }
    }
}
