//! Database query operations for the `trunkr` event store
//!
//! Table names come from [`StoreConfig`] and are spliced into the SQL text, so
//! callers must have run [`StoreConfig::check`] first.

use crate::models::{CompletedCallRow, TalkgroupRow, UnitActivityRow};
use sqlx::PgPool;
use trunkr_core::{Error, Result, StoreConfig, TalkgroupId, UnixSeconds};

fn limit_param(limit: Option<usize>) -> Option<i64> {
    limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX))
}

/// Unit activity database operations
pub struct UnitActivityQueries;

impl UnitActivityQueries {
    /// Unit events at or after `since`, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn recent(
        pool: &PgPool,
        store: &StoreConfig,
        since: UnixSeconds,
        limit: Option<usize>,
    ) -> Result<Vec<UnitActivityRow>> {
        let query = format!(
            r#"
            SELECT id, "timestamp", radio_id, action, talkgroup, source
            FROM {}
            WHERE "timestamp" >= $1
            ORDER BY "timestamp" DESC, id DESC
            LIMIT $2
            "#,
            store.units_table
        );

        sqlx::query_as::<_, UnitActivityRow>(&query)
            .bind(since)
            .bind(limit_param(limit))
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Timestamp of the newest unit event, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn latest_timestamp(
        pool: &PgPool,
        store: &StoreConfig,
    ) -> Result<Option<UnixSeconds>> {
        let query = format!(r#"SELECT MAX("timestamp") FROM {}"#, store.units_table);

        sqlx::query_scalar::<_, Option<i64>>(&query)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Completed call database operations
pub struct CompletedCallQueries;

impl CompletedCallQueries {
    /// Completed calls starting at or after `since`, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn recent(
        pool: &PgPool,
        store: &StoreConfig,
        since: UnixSeconds,
        limit: Option<usize>,
    ) -> Result<Vec<CompletedCallRow>> {
        let query = format!(
            r"
            SELECT id, talkgroup, start_time, call_length, transcription,
                   talkgroup_description, src_list
            FROM {}
            WHERE start_time >= $1
            ORDER BY start_time DESC, id DESC
            LIMIT $2
            ",
            store.calls_table
        );

        sqlx::query_as::<_, CompletedCallRow>(&query)
            .bind(since)
            .bind(limit_param(limit))
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Talkgroup reference database operations
pub struct TalkgroupQueries;

impl TalkgroupQueries {
    /// Find a talkgroup by its decimal code
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails. A missing talkgroup is
    /// `Ok(None)`.
    pub async fn find_by_decimal(
        pool: &PgPool,
        store: &StoreConfig,
        decimal: TalkgroupId,
    ) -> Result<Option<TalkgroupRow>> {
        let query = format!(
            r#"SELECT "decimal", alpha_tag, description FROM {} WHERE "decimal" = $1 LIMIT 1"#,
            store.talkgroups_table
        );

        sqlx::query_as::<_, TalkgroupRow>(&query)
            .bind(decimal)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Notification trigger introspection
pub struct NotifyQueries;

impl NotifyQueries {
    /// Tables among `tables` that carry an enabled change-notification trigger
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn notify_trigger_tables(pool: &PgPool, tables: &[&str]) -> Result<Vec<String>> {
        let query = r"
            SELECT DISTINCT c.relname::TEXT
            FROM pg_trigger t
            JOIN pg_class c ON c.oid = t.tgrelid
            JOIN pg_proc p ON p.oid = t.tgfoid
            WHERE NOT t.tgisinternal
              AND t.tgenabled <> 'D'
              AND p.proname = 'trunkr_notify_change'
              AND c.relname = ANY($1)
        ";

        let names: Vec<String> = tables.iter().map(|t| (*t).to_string()).collect();

        sqlx::query_scalar::<_, String>(query)
            .bind(names)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
