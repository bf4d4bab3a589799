//! FitQuota: daily quota metering for AI video analysis.
//!
//! Free accounts get a fixed number of analyses per calendar day; paid
//! accounts are unlimited. The HTTP layer in [`api`] exposes check,
//! increment, status and an admin paid-flag override over the
//! [`quota::QuotaService`].

pub mod api;
pub mod config;
pub mod error;
pub mod quota;
pub mod store;

pub use error::{QuotaError, Result};
