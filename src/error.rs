//! Error types for FitQuota.
//!
//! Every fallible library operation returns [`Result`]. The variants map
//! one-to-one onto the outcomes the HTTP layer distinguishes: an unknown
//! account, a malformed request, a credential problem, or a storage fault.

use thiserror::Error;

/// Errors surfaced by the quota subsystem.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// The external identity does not resolve to a provisioned account.
    #[error("not found: {0}")]
    NotFound(String),

    /// A request was malformed (missing target id, non-boolean flag, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// The underlying directory or ledger store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Missing, malformed, or expired credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials are valid but lack the capability for this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Invalid or unloadable configuration.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for QuotaError {
    fn from(err: rusqlite::Error) -> Self {
        QuotaError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for QuotaError {
    fn from(err: tokio::task::JoinError) -> Self {
        QuotaError::Storage(format!("storage task failed: {err}"))
    }
}

impl QuotaError {
    /// Whether this error is an expected, caller-recoverable outcome rather
    /// than a fault.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            QuotaError::NotFound(_)
                | QuotaError::Validation(_)
                | QuotaError::Unauthorized(_)
                | QuotaError::Forbidden(_)
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, QuotaError>;
