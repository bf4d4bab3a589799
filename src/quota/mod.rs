//! Daily quota metering and enforcement.
//!
//! - [`policy`]: tier → `{limit, remaining, allowed}` (pure)
//! - [`directory`]: external identity → account + paid flag
//! - [`ledger`]: per-account, per-day atomic request counter
//! - [`clock`]: date key and reset time for a configured day boundary
//! - [`service`]: the check / increment / status / set-paid operations

pub mod clock;
pub mod directory;
pub mod ledger;
pub mod policy;
pub mod service;

use serde::{Deserialize, Serialize};

pub use clock::{Clock, DayBoundary, FixedClock, SystemClock};
pub use directory::{validate_external_id, Account, NewAccount, SqliteDirectory, UserDirectory};
pub use ledger::{SqliteLedger, UsageLedger, UsageRecord};
pub use policy::{QuotaDecision, QuotaPolicy, FREE_DAILY_LIMIT, UNLIMITED};
pub use service::{
    PaidStatus, PaidStatusUpdate, QuotaCheck, QuotaIncrement, QuotaService, QuotaStatus,
};

/// Tunable quota settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Gated actions a free account may perform per calendar day.
    pub free_daily_limit: i64,
    /// Time zone in which calendar days (and `resetTime`) begin.
    pub day_boundary: DayBoundary,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_daily_limit: FREE_DAILY_LIMIT,
            day_boundary: DayBoundary::Utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_config_defaults() {
        let cfg = QuotaConfig::default();
        assert_eq!(cfg.free_daily_limit, 5);
        assert_eq!(cfg.day_boundary, DayBoundary::Utc);
    }

    #[test]
    fn test_quota_config_partial_deserialize() {
        let cfg: QuotaConfig = serde_json::from_str(r#"{"free_daily_limit": 3}"#).unwrap();
        assert_eq!(cfg.free_daily_limit, 3);
        assert_eq!(cfg.day_boundary, DayBoundary::Utc);
    }
}
