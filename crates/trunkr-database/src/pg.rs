//! `PostgreSQL` event store backed by `LISTEN`/`NOTIFY`

use crate::Database;
use crate::models::ChangeEvent;
use crate::queries::{CompletedCallQueries, NotifyQueries, TalkgroupQueries, UnitActivityQueries};
use crate::store::{ChangeSubscription, EventStore};
use async_trait::async_trait;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tracing::{debug, info};
use trunkr_core::{
    CompletedCallRecord, DatabaseConfig, Error, Result, StoreConfig, StreamKind, TalkgroupId,
    TalkgroupInfo, UnitActivityEvent, UnixSeconds,
};

/// Event store reading from `PostgreSQL`
#[derive(Debug, Clone)]
pub struct PgEventStore {
    db: Database,
    store: StoreConfig,
}

impl PgEventStore {
    /// Wrap an existing pool
    ///
    /// # Errors
    ///
    /// Returns a validation error if the table or channel names are not plain
    /// identifiers.
    pub fn new(db: Database, store: StoreConfig) -> Result<Self> {
        store.check()?;
        Ok(Self { db, store })
    }

    /// Connect to the database described by `database`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the pool cannot be
    /// established.
    pub async fn connect(database: &DatabaseConfig, store: StoreConfig) -> Result<Self> {
        store.check()?;
        let db = Database::new(database).await?;
        info!(
            units_table = %store.units_table,
            calls_table = %store.calls_table,
            "Connected to event store"
        );
        Ok(Self { db, store })
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn ping(&self) -> Result<()> {
        self.db.health_check().await
    }

    async fn supports_push(&self) -> Result<bool> {
        let wanted = [
            self.store.table(StreamKind::Units),
            self.store.table(StreamKind::Calls),
        ];
        let found = NotifyQueries::notify_trigger_tables(self.db.pool(), &wanted).await?;
        let supported = wanted.iter().all(|t| found.iter().any(|f| f == t));
        debug!(?found, supported, "Probed change-notification triggers");
        Ok(supported)
    }

    async fn recent_units(
        &self,
        since: UnixSeconds,
        limit: Option<usize>,
    ) -> Result<Vec<UnitActivityEvent>> {
        let rows = UnitActivityQueries::recent(self.db.pool(), &self.store, since, limit).await?;
        Ok(rows.into_iter().map(UnitActivityEvent::from).collect())
    }

    async fn recent_calls(
        &self,
        since: UnixSeconds,
        limit: Option<usize>,
    ) -> Result<Vec<CompletedCallRecord>> {
        let rows = CompletedCallQueries::recent(self.db.pool(), &self.store, since, limit).await?;
        Ok(rows.into_iter().map(CompletedCallRecord::from).collect())
    }

    async fn talkgroup(&self, decimal: TalkgroupId) -> Result<Option<TalkgroupInfo>> {
        let row = TalkgroupQueries::find_by_decimal(self.db.pool(), &self.store, decimal).await?;
        Ok(row.map(TalkgroupInfo::from))
    }

    async fn latest_unit_timestamp(&self) -> Result<Option<UnixSeconds>> {
        UnitActivityQueries::latest_timestamp(self.db.pool(), &self.store).await
    }

    async fn watch(&self, stream: StreamKind) -> Result<Box<dyn ChangeSubscription>> {
        let channel = self.store.channel(stream);
        let mut listener = PgListener::connect_with(self.db.pool())
            .await
            .map_err(|e| Error::subscription(stream.as_str(), e.to_string()))?;
        listener
            .listen(channel)
            .await
            .map_err(|e| Error::subscription(stream.as_str(), e.to_string()))?;

        debug!(%stream, channel, "Listening for change notifications");
        Ok(Box::new(PgSubscription { stream, listener }))
    }
}

/// Live subscription on one notification channel
#[derive(Debug)]
pub struct PgSubscription {
    stream: StreamKind,
    listener: PgListener,
}

#[async_trait]
impl ChangeSubscription for PgSubscription {
    fn stream(&self) -> StreamKind {
        self.stream
    }

    async fn next_change(&mut self, max_wait: Duration) -> Result<Option<ChangeEvent>> {
        match tokio::time::timeout(max_wait, self.listener.try_recv()).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(notification))) => Ok(Some(ChangeEvent::from_payload(
                self.stream,
                notification.payload(),
            ))),
            // The listener lost its connection; notifications may have been missed
            Ok(Ok(None)) => Err(Error::subscription(
                self.stream.as_str(),
                "notification connection lost",
            )),
            Ok(Err(e)) => Err(Error::subscription(self.stream.as_str(), e.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    fn lazy_database() -> Database {
        let pool = sqlx::PgPool::connect_lazy("postgresql://invalid:5432/nonexistent")
            .expect("Failed to create test pool");
        Database::from_pool(pool)
    }

    #[tokio::test]
    async fn test_new_rejects_bad_identifiers() {
        let store = StoreConfig {
            units_table: "units metadata".to_string(),
            ..StoreConfig::default()
        };
        let result = PgEventStore::new(lazy_database(), store);
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[tokio::test]
    async fn test_probe_fails_without_database() {
        let store = PgEventStore::new(lazy_database(), StoreConfig::default()).unwrap();
        assert!(store.supports_push().await.is_err());
        assert!(store.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_watch_fails_without_database() {
        let store = PgEventStore::new(lazy_database(), StoreConfig::default()).unwrap();
        let result = store.watch(StreamKind::Calls).await;
        match result {
            Err(Error::Subscription { stream, .. }) => assert_eq!(stream, "calls"),
            other => panic!("Expected subscription error, got {other:?}"),
        }
    }
}
