//! Day boundary resolution.
//!
//! The ledger is keyed by calendar date and knows nothing about time zones.
//! This module turns an instant into that date key, and into the informational
//! `resetTime` (start of the next calendar day), using one configured boundary
//! so the two can never disagree.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Time zone in which calendar days start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DayBoundary {
    /// Days roll over at 00:00 UTC (default).
    #[default]
    Utc,
    /// Days roll over at 00:00 in the server process's local time zone.
    Local,
}

impl DayBoundary {
    /// Calendar date containing `now`.
    pub fn date_key(self, now: DateTime<Utc>) -> NaiveDate {
        match self {
            DayBoundary::Utc => now.date_naive(),
            DayBoundary::Local => now.with_timezone(&Local).date_naive(),
        }
    }

    /// Start of the calendar day after the one containing `now`.
    pub fn next_reset(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.date_key(now);
        let midnight = today
            .succ_opt()
            .unwrap_or(today)
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default();
        match self {
            DayBoundary::Utc => Utc.from_utc_datetime(&midnight),
            DayBoundary::Local => local_instant(midnight),
        }
    }
}

/// Resolve a local wall-clock time, stepping over a DST gap if midnight does
/// not exist on that day.
fn local_instant(wall: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&wall)
        .earliest()
        .or_else(|| Local.from_local_datetime(&(wall + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&wall))
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replay tooling.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|g| *g).unwrap_or_else(|e| *e.into_inner())
    }
}
