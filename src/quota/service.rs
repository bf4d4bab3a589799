//! Quota service: directory lookup → ledger → policy.
//!
//! `check` and `status` are read-only. `increment` always records usage and
//! never rejects on quota: by the time it is called the gated action has
//! already run. Callers gate on `check` first; a concurrent request can slip
//! in between the two, so counts may exceed the nominal limit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::clock::{Clock, DayBoundary, SystemClock};
use super::directory::{validate_external_id, Account, SqliteDirectory, UserDirectory};
use super::ledger::{SqliteLedger, UsageLedger};
use super::policy::QuotaPolicy;
use super::QuotaConfig;
use crate::error::{QuotaError, Result};
use crate::store::Database;

/// Response of [`QuotaService::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaCheck {
    pub allowed: bool,
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
    pub is_paid: bool,
    /// Start of the next calendar day. Informational only.
    pub reset_time: DateTime<Utc>,
}

/// Response of [`QuotaService::increment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaIncrement {
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
    pub is_paid: bool,
}

/// Response of [`QuotaService::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub limit: i64,
    pub used: i64,
    pub remaining: i64,
    pub is_paid: bool,
    pub reset_time: DateTime<Utc>,
}

impl From<QuotaCheck> for QuotaStatus {
    fn from(c: QuotaCheck) -> Self {
        Self {
            limit: c.limit,
            used: c.used,
            remaining: c.remaining,
            is_paid: c.is_paid,
            reset_time: c.reset_time,
        }
    }
}

/// Account projection returned by the admin paid-flag update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidStatus {
    pub external_id: String,
    pub is_paid: bool,
}

impl From<Account> for PaidStatus {
    fn from(a: Account) -> Self {
        Self {
            external_id: a.external_id,
            is_paid: a.is_paid,
        }
    }
}

/// A validated admin request to change an account's paid flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidStatusUpdate {
    pub target_external_id: String,
    pub is_paid: bool,
}

impl PaidStatusUpdate {
    /// Validate a raw JSON request body.
    ///
    /// The target is the first of `targetExternalId`, `targetUserId` whose
    /// value is a string, so a `null` in one field does not hide the other.
    /// It must be a valid directory key. `isPaid` must be a JSON boolean
    /// (not `"true"`, not `1`).
    pub fn from_json(body: &Value) -> Result<Self> {
        let target = ["targetExternalId", "targetUserId"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .ok_or_else(|| {
                QuotaError::Validation("targetExternalId (string) is required".into())
            })?;
        validate_external_id(target)?;
        let is_paid = body
            .get("isPaid")
            .and_then(Value::as_bool)
            .ok_or_else(|| QuotaError::Validation("isPaid (boolean) is required".into()))?;
        Ok(Self {
            target_external_id: target.to_string(),
            is_paid,
        })
    }
}

/// Orchestrates quota checks and usage recording.
#[derive(Clone)]
pub struct QuotaService {
    directory: Arc<dyn UserDirectory>,
    ledger: Arc<dyn UsageLedger>,
    policy: QuotaPolicy,
    boundary: DayBoundary,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for QuotaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaService")
            .field("policy", &self.policy)
            .field("boundary", &self.boundary)
            .finish_non_exhaustive()
    }
}

impl QuotaService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        ledger: Arc<dyn UsageLedger>,
        config: &QuotaConfig,
    ) -> Self {
        Self {
            directory,
            ledger,
            policy: QuotaPolicy::new(config.free_daily_limit),
            boundary: config.day_boundary,
            clock: Arc::new(SystemClock),
        }
    }

    /// Wire the SQLite directory and ledger over one database handle.
    pub fn with_database(db: Database, config: &QuotaConfig) -> Self {
        Self::new(
            Arc::new(SqliteDirectory::new(db.clone())),
            Arc::new(SqliteLedger::new(db)),
            config,
        )
    }

    /// Replace the clock (tests, replay).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    pub fn ledger(&self) -> &Arc<dyn UsageLedger> {
        &self.ledger
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    /// Whether `external_id` may perform one more gated action today.
    pub async fn check(&self, external_id: &str) -> Result<QuotaCheck> {
        info!(external_id, "checking quota");
        let snapshot = self.snapshot(external_id).await?;
        if snapshot.is_paid {
            info!(external_id, used = snapshot.used, "quota check: unlimited (paid)");
        } else {
            info!(
                external_id,
                used = snapshot.used,
                limit = snapshot.limit,
                allowed = snapshot.allowed,
                "quota check"
            );
        }
        Ok(snapshot)
    }

    /// Record one gated action for today and return the post-increment state.
    pub async fn increment(&self, external_id: &str) -> Result<QuotaIncrement> {
        info!(external_id, "incrementing quota");
        let account = self.resolve(external_id).await?;
        let today = self.boundary.date_key(self.clock.now());
        let used = self.ledger.increment(account.id, today).await?;
        let decision = self.policy.decide(account.is_paid, used);

        if account.is_paid {
            info!(external_id, used, "quota incremented: unlimited (paid)");
        } else if used > decision.limit {
            warn!(
                external_id,
                used,
                limit = decision.limit,
                "quota incremented past daily limit"
            );
        } else {
            info!(external_id, used, limit = decision.limit, "quota incremented");
        }

        Ok(QuotaIncrement {
            used,
            limit: decision.limit,
            remaining: decision.remaining,
            is_paid: account.is_paid,
        })
    }

    /// Read-only usage summary for UI polling.
    pub async fn status(&self, external_id: &str) -> Result<QuotaStatus> {
        info!(external_id, "fetching quota status");
        Ok(self.snapshot(external_id).await?.into())
    }

    /// Administrative override of an account's paid flag.
    pub async fn set_paid_status(&self, external_id: &str, is_paid: bool) -> Result<PaidStatus> {
        info!(external_id, is_paid, "updating paid status");
        let account = self
            .directory
            .set_paid_status(external_id, is_paid)
            .await
            .inspect_err(|e| log_failure(external_id, e))?;
        info!(external_id, is_paid = account.is_paid, "paid status updated");
        Ok(account.into())
    }

    async fn resolve(&self, external_id: &str) -> Result<Account> {
        self.directory
            .resolve(external_id)
            .await
            .inspect_err(|e| log_failure(external_id, e))
    }

    async fn snapshot(&self, external_id: &str) -> Result<QuotaCheck> {
        let account = self.resolve(external_id).await?;
        let now = self.clock.now();
        let today = self.boundary.date_key(now);
        let used = self.ledger.used_count(account.id, today).await?;
        let decision = self.policy.decide(account.is_paid, used);
        Ok(QuotaCheck {
            allowed: decision.allowed,
            used,
            limit: decision.limit,
            remaining: decision.remaining,
            is_paid: account.is_paid,
            reset_time: self.boundary.next_reset(now),
        })
    }
}

fn log_failure(external_id: &str, err: &QuotaError) {
    match err {
        QuotaError::NotFound(_) => warn!(external_id, "user not found"),
        other => tracing::error!(external_id, error = %other, "directory lookup failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::clock::FixedClock;
    use crate::quota::directory::NewAccount;
    use crate::quota::policy::UNLIMITED;
    use chrono::Duration;
    use serde_json::json;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn service_at(now: &str) -> (QuotaService, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(at(now)));
        let svc = QuotaService::with_database(
            Database::open_in_memory().unwrap(),
            &QuotaConfig::default(),
        )
        .with_clock(clock.clone());
        (svc, clock)
    }

    async fn service_with(users: &[&str]) -> QuotaService {
        let (svc, _) = service_at("2026-03-01T12:00:00Z");
        for u in users {
            svc.directory().provision(NewAccount::new(*u)).await.unwrap();
        }
        svc
    }

    #[tokio::test]
    async fn test_check_fresh_free_user() {
        let svc = service_with(&["u1"]).await;
        let c = svc.check("u1").await.unwrap();
        assert!(c.allowed);
        assert_eq!(c.used, 0);
        assert_eq!(c.limit, 5);
        assert_eq!(c.remaining, 5);
        assert!(!c.is_paid);
        assert_eq!(c.reset_time, at("2026-03-02T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_check_does_not_create_usage() {
        let svc = service_with(&["u1"]).await;
        svc.check("u1").await.unwrap();
        svc.status("u1").await.unwrap();
        let account = svc.directory().resolve("u1").await.unwrap();
        let today = chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(svc.ledger().record(account.id, today).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_free_user_at_cap_and_increment_never_blocks() {
        let svc = service_with(&["u1"]).await;
        for expected in 1..=5 {
            let inc = svc.increment("u1").await.unwrap();
            assert_eq!(inc.used, expected);
            assert_eq!(inc.remaining, 5 - expected);
        }

        let c = svc.check("u1").await.unwrap();
        assert!(!c.allowed);
        assert_eq!(c.used, 5);
        assert_eq!(c.limit, 5);
        assert_eq!(c.remaining, 0);

        let sixth = svc.increment("u1").await.unwrap();
        assert_eq!(sixth.used, 6);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.limit, 5);
    }

    #[tokio::test]
    async fn test_paid_user_unlimited() {
        let svc = service_with(&["u2"]).await;
        let updated = svc.set_paid_status("u2", true).await.unwrap();
        assert_eq!(
            updated,
            PaidStatus {
                external_id: "u2".into(),
                is_paid: true
            }
        );
        for _ in 0..100 {
            svc.increment("u2").await.unwrap();
        }
        let c = svc.check("u2").await.unwrap();
        assert!(c.allowed);
        assert_eq!(c.used, 100);
        assert_eq!(c.limit, UNLIMITED);
        assert_eq!(c.remaining, UNLIMITED);
        assert!(c.is_paid);
    }

    #[tokio::test]
    async fn test_downgrade_applies_immediately() {
        let svc = service_with(&["u3"]).await;
        svc.set_paid_status("u3", true).await.unwrap();
        for _ in 0..7 {
            svc.increment("u3").await.unwrap();
        }
        svc.set_paid_status("u3", false).await.unwrap();
        let c = svc.check("u3").await.unwrap();
        assert!(!c.allowed);
        assert_eq!(c.used, 7);
        assert_eq!(c.remaining, 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found_everywhere() {
        let svc = service_with(&[]).await;
        assert!(matches!(svc.check("ghost").await, Err(QuotaError::NotFound(_))));
        assert!(matches!(svc.increment("ghost").await, Err(QuotaError::NotFound(_))));
        assert!(matches!(svc.status("ghost").await, Err(QuotaError::NotFound(_))));
        assert!(matches!(
            svc.set_paid_status("ghost", true).await,
            Err(QuotaError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_status_matches_check() {
        let svc = service_with(&["u1"]).await;
        svc.increment("u1").await.unwrap();
        let c = svc.check("u1").await.unwrap();
        let s = svc.status("u1").await.unwrap();
        assert_eq!(s, QuotaStatus::from(c));
        assert_eq!(s.used, 1);
        assert_eq!(s.remaining, 4);
    }

    #[tokio::test]
    async fn test_day_rollover_starts_fresh() {
        let (svc, clock) = service_at("2026-03-01T23:59:00Z");
        svc.directory().provision(NewAccount::new("u1")).await.unwrap();
        for _ in 0..5 {
            svc.increment("u1").await.unwrap();
        }
        assert!(!svc.check("u1").await.unwrap().allowed);

        clock.advance(Duration::minutes(2));
        let c = svc.check("u1").await.unwrap();
        assert!(c.allowed);
        assert_eq!(c.used, 0);
        assert_eq!(c.reset_time, at("2026-03-03T00:00:00Z"));

        // Going back to yesterday still sees yesterday's count.
        clock.set(at("2026-03-01T23:59:30Z"));
        assert_eq!(svc.check("u1").await.unwrap().used, 5);
    }

    #[tokio::test]
    async fn test_concurrent_increments_through_service() {
        let svc = Arc::new(service_with(&["u1"]).await);
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.increment("u1").await.unwrap().used })
            })
            .collect();
        let mut counts = Vec::new();
        for h in handles {
            counts.push(h.await.unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=50).collect::<Vec<i64>>());
        assert_eq!(svc.status("u1").await.unwrap().used, 50);
    }

    #[tokio::test]
    async fn test_custom_free_limit() {
        let svc = QuotaService::with_database(
            Database::open_in_memory().unwrap(),
            &QuotaConfig {
                free_daily_limit: 2,
                ..Default::default()
            },
        );
        svc.directory().provision(NewAccount::new("u1")).await.unwrap();
        svc.increment("u1").await.unwrap();
        svc.increment("u1").await.unwrap();
        let c = svc.check("u1").await.unwrap();
        assert_eq!(c.limit, 2);
        assert!(!c.allowed);
    }

    // --- PaidStatusUpdate validation ---

    #[test]
    fn test_paid_update_accepts_both_field_names() {
        let a = PaidStatusUpdate::from_json(&json!({"targetExternalId": "u1", "isPaid": true}))
            .unwrap();
        let b = PaidStatusUpdate::from_json(&json!({"targetUserId": "u1", "isPaid": true}))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.target_external_id, "u1");
        assert!(a.is_paid);
    }

    #[test]
    fn test_paid_update_rejects_string_flag() {
        let r = PaidStatusUpdate::from_json(&json!({"targetExternalId": "u1", "isPaid": "yes"}));
        assert!(matches!(r, Err(QuotaError::Validation(_))));
    }

    #[test]
    fn test_paid_update_rejects_numeric_flag() {
        let r = PaidStatusUpdate::from_json(&json!({"targetExternalId": "u1", "isPaid": 1}));
        assert!(matches!(r, Err(QuotaError::Validation(_))));
    }

    #[test]
    fn test_paid_update_rejects_missing_target() {
        for body in [
            json!({"isPaid": true}),
            json!({"targetExternalId": "", "isPaid": true}),
            json!({"targetExternalId": 42, "isPaid": true}),
        ] {
            assert!(
                matches!(PaidStatusUpdate::from_json(&body), Err(QuotaError::Validation(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn test_paid_update_null_target_does_not_hide_alias() {
        for body in [
            json!({"targetExternalId": null, "targetUserId": "u2", "isPaid": true}),
            json!({"targetExternalId": 7, "targetUserId": "u2", "isPaid": true}),
        ] {
            let update = PaidStatusUpdate::from_json(&body).unwrap();
            assert_eq!(update.target_external_id, "u2", "{body}");
        }
    }

    #[test]
    fn test_paid_update_prefers_external_id_when_both_are_strings() {
        let update = PaidStatusUpdate::from_json(
            &json!({"targetExternalId": "a", "targetUserId": "b", "isPaid": false}),
        )
        .unwrap();
        assert_eq!(update.target_external_id, "a");
        assert!(!update.is_paid);
    }

    #[test]
    fn test_paid_update_rejects_padded_target() {
        let r = PaidStatusUpdate::from_json(&json!({"targetExternalId": " u2", "isPaid": true}));
        assert!(matches!(r, Err(QuotaError::Validation(_))));
    }

    #[test]
    fn test_check_serializes_camel_case() {
        let c = QuotaCheck {
            allowed: true,
            used: 0,
            limit: 5,
            remaining: 5,
            is_paid: false,
            reset_time: at("2026-03-02T00:00:00Z"),
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["isPaid"], false);
        assert_eq!(v["resetTime"], "2026-03-02T00:00:00Z");
    }
}
