//! Daily usage ledger.
//!
//! One row per (account, calendar date). A missing row means nothing was used
//! that day. The only mutation is an atomic insert-or-add-one; counts are
//! never decremented or deleted here.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::error::Result;
use crate::store::Database;

/// Format of the stored date key.
const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// A persisted usage row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub account_id: i64,
    pub date: NaiveDate,
    pub request_count: i64,
    /// RFC 3339 timestamp of the most recent increment.
    pub last_request_at: String,
}

/// Per-account, per-day request counter.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Count recorded for `date`, or 0 when no row exists. Never writes.
    async fn used_count(&self, account_id: i64, date: NaiveDate) -> Result<i64>;

    /// Atomically add one to the count for `date`, creating the row at 1 if
    /// absent, and return the count after the increment.
    ///
    /// Concurrent calls for the same key yield a gapless sequence of counts.
    async fn increment(&self, account_id: i64, date: NaiveDate) -> Result<i64>;

    /// Full row for `date`, if any.
    async fn record(&self, account_id: i64, date: NaiveDate) -> Result<Option<UsageRecord>>;
}

/// [`UsageLedger`] backed by the `genai_usage` table.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    db: Database,
}

impl SqliteLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

#[async_trait]
impl UsageLedger for SqliteLedger {
    async fn used_count(&self, account_id: i64, date: NaiveDate) -> Result<i64> {
        let key = date_key(date);
        let count = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT request_count FROM genai_usage \
                         WHERE user_id = ?1 AND request_date = ?2",
                        params![account_id, key],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?)
            })
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn increment(&self, account_id: i64, date: NaiveDate) -> Result<i64> {
        let key = date_key(date);
        let now = Utc::now().to_rfc3339();
        // Single statement: SQLite holds the write lock for the whole upsert,
        // so no other connection can interleave between read and write.
        self.db
            .call(move |conn| {
                Ok(conn.query_row(
                    "INSERT INTO genai_usage (user_id, request_date, request_count, last_request_at) \
                     VALUES (?1, ?2, 1, ?3) \
                     ON CONFLICT(user_id, request_date) DO UPDATE SET \
                         request_count = genai_usage.request_count + 1, \
                         last_request_at = excluded.last_request_at \
                     RETURNING request_count",
                    params![account_id, key, now],
                    |row| row.get::<_, i64>(0),
                )?)
            })
            .await
    }

    async fn record(&self, account_id: i64, date: NaiveDate) -> Result<Option<UsageRecord>> {
        let key = date_key(date);
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT request_count, last_request_at FROM genai_usage \
                         WHERE user_id = ?1 AND request_date = ?2",
                        params![account_id, key],
                        |row| {
                            Ok(UsageRecord {
                                account_id,
                                date,
                                request_count: row.get(0)?,
                                last_request_at: row.get(1)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await
    }
}
