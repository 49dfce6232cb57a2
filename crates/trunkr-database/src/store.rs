//! Event store abstraction used by the monitor

use crate::models::ChangeEvent;
use async_trait::async_trait;
use std::time::Duration;
use trunkr_core::{
    CompletedCallRecord, Result, StreamKind, TalkgroupId, TalkgroupInfo, UnitActivityEvent,
    UnixSeconds,
};

/// Read and subscribe access to the unit activity, completed call and
/// talkgroup collections
#[async_trait]
pub trait EventStore: Send + Sync + std::fmt::Debug {
    /// Cheap connectivity check
    async fn ping(&self) -> Result<()>;

    /// Whether live change subscriptions are available
    ///
    /// `Ok(false)` means the deployment cannot push; an error means the probe
    /// itself failed.
    async fn supports_push(&self) -> Result<bool>;

    /// Unit events at or after `since`, newest first, at most `limit`
    async fn recent_units(
        &self,
        since: UnixSeconds,
        limit: Option<usize>,
    ) -> Result<Vec<UnitActivityEvent>>;

    /// Completed calls starting at or after `since`, newest first, at most `limit`
    async fn recent_calls(
        &self,
        since: UnixSeconds,
        limit: Option<usize>,
    ) -> Result<Vec<CompletedCallRecord>>;

    /// Talkgroup reference data; `Ok(None)` when the talkgroup is unknown
    async fn talkgroup(&self, decimal: TalkgroupId) -> Result<Option<TalkgroupInfo>>;

    /// Timestamp of the newest unit event
    async fn latest_unit_timestamp(&self) -> Result<Option<UnixSeconds>>;

    /// Open a live subscription on one stream
    async fn watch(&self, stream: StreamKind) -> Result<Box<dyn ChangeSubscription>>;
}

/// A live subscription to one stream
#[async_trait]
pub trait ChangeSubscription: Send + std::fmt::Debug {
    /// Stream this subscription follows
    fn stream(&self) -> StreamKind;

    /// Wait up to `max_wait` for the next change
    ///
    /// Returns `Ok(None)` when nothing arrived in time. An error means the
    /// subscription is broken and must be reopened.
    async fn next_change(&mut self, max_wait: Duration) -> Result<Option<ChangeEvent>>;
}
