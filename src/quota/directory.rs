//! User directory: external identity → internal account.
//!
//! The external identity is an opaque string issued by the identity provider.
//! Each maps to exactly one internal numeric id through a unique index.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{QuotaError, Result};
use crate::store::Database;

/// An account as stored in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Internal surrogate key used by the ledger.
    pub id: i64,
    /// Identity provider subject. Immutable once created.
    pub external_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_paid: bool,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-updated timestamp.
    pub updated_at: String,
}

/// Fields accepted when provisioning an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAccount {
    pub external_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

impl NewAccount {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            ..Default::default()
        }
    }
}

/// Account lookup and the admin-only paid flag write.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve an external identity.
    ///
    /// Returns [`QuotaError::NotFound`] when no account exists.
    async fn resolve(&self, external_id: &str) -> Result<Account>;

    /// Set the paid flag and return the updated account. Idempotent.
    ///
    /// Returns [`QuotaError::NotFound`] when no account exists.
    async fn set_paid_status(&self, external_id: &str, is_paid: bool) -> Result<Account>;

    /// Create the account if absent and return it. An existing account is
    /// returned unchanged.
    async fn provision(&self, account: NewAccount) -> Result<Account>;
}

const ACCOUNT_COLUMNS: &str =
    "id, external_id, email, full_name, is_paid, created_at, updated_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        external_id: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        is_paid: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Check that `external_id` is usable as a directory key: non-empty and
/// without leading or trailing whitespace. Keys are compared byte for byte,
/// so a padded id would name a different account.
pub fn validate_external_id(external_id: &str) -> Result<()> {
    if external_id.is_empty() {
        return Err(QuotaError::Validation("external id must not be empty".into()));
    }
    if external_id.trim() != external_id {
        return Err(QuotaError::Validation(format!(
            "external id {external_id:?} has surrounding whitespace"
        )));
    }
    Ok(())
}

fn not_found(external_id: &str) -> QuotaError {
    QuotaError::NotFound(format!("user {external_id}"))
}

/// [`UserDirectory`] backed by the `users` table.
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    db: Database,
}

impl SqliteDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for SqliteDirectory {
    async fn resolve(&self, external_id: &str) -> Result<Account> {
        let key = external_id.to_string();
        let found = self
            .db
            .call(move |conn| {
                let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE external_id = ?1");
                Ok(conn
                    .query_row(&sql, params![key], account_from_row)
                    .optional()?)
            })
            .await?;
        found.ok_or_else(|| not_found(external_id))
    }

    async fn set_paid_status(&self, external_id: &str, is_paid: bool) -> Result<Account> {
        let key = external_id.to_string();
        let now = Utc::now().to_rfc3339();
        let updated = self
            .db
            .call(move |conn| {
                let sql = format!(
                    "UPDATE users SET is_paid = ?1, updated_at = ?2 WHERE external_id = ?3 \
                     RETURNING {ACCOUNT_COLUMNS}"
                );
                Ok(conn
                    .query_row(&sql, params![is_paid, now, key], account_from_row)
                    .optional()?)
            })
            .await?;
        updated.ok_or_else(|| not_found(external_id))
    }

    async fn provision(&self, account: NewAccount) -> Result<Account> {
        validate_external_id(&account.external_id)?;
        let external_id = account.external_id;
        let now = Utc::now().to_rfc3339();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (external_id, email, full_name, is_paid, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, 0, ?4, ?4) \
                     ON CONFLICT(external_id) DO NOTHING",
                    params![external_id, account.email, account.full_name, now],
                )?;
                let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE external_id = ?1");
                Ok(conn.query_row(&sql, params![external_id], account_from_row)?)
            })
            .await
    }
}
