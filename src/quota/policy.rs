//! Tiered daily quota policy.
//!
//! Pure and deterministic: given an account tier and today's usage count it
//! produces a [`QuotaDecision`]. No I/O happens here.

use serde::Serialize;

/// Default number of gated actions a free account may perform per day.
pub const FREE_DAILY_LIMIT: i64 = 5;

/// Value reported for both `limit` and `remaining` when no numeric limit
/// applies. Never a valid count.
pub const UNLIMITED: i64 = -1;

/// Outcome of evaluating the policy for one account on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    /// Daily limit, or [`UNLIMITED`].
    pub limit: i64,
    /// Units left today, floored at zero, or [`UNLIMITED`].
    pub remaining: i64,
    /// Whether another gated action is permitted right now.
    pub allowed: bool,
}

impl QuotaDecision {
    pub fn is_unlimited(&self) -> bool {
        self.limit == UNLIMITED
    }
}

/// Fixed two-tier policy: paid accounts are unlimited, free accounts get
/// `free_daily_limit` actions per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    free_daily_limit: i64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::new(FREE_DAILY_LIMIT)
    }
}

impl QuotaPolicy {
    /// Build a policy with a custom free-tier limit. Negative limits clamp
    /// to zero.
    pub fn new(free_daily_limit: i64) -> Self {
        Self {
            free_daily_limit: free_daily_limit.max(0),
        }
    }

    pub fn free_daily_limit(&self) -> i64 {
        self.free_daily_limit
    }

    /// Evaluate the policy.
    ///
    /// `used` may exceed the free limit when concurrent increments race past
    /// a check; `remaining` still floors at zero.
    pub fn decide(&self, is_paid: bool, used: i64) -> QuotaDecision {
        if is_paid {
            return QuotaDecision {
                limit: UNLIMITED,
                remaining: UNLIMITED,
                allowed: true,
            };
        }

        let limit = self.free_daily_limit;
        let remaining = limit.saturating_sub(used.max(0)).max(0);
        QuotaDecision {
            limit,
            remaining,
            allowed: remaining > 0,
        }
    }
}
