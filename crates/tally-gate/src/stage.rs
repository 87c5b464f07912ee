use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use tally_types::{AccountId, CurrencyType, EntryKind};

use crate::error::GateError;

// ---------------------------------------------------------------------------
// BalanceView
// ---------------------------------------------------------------------------

/// The part of a balance the limit stages need to see.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceView {
    /// Current balance before the request is applied.
    pub current: i64,
    /// Amount earned since `last_reset`.
    pub daily_earned: i64,
    /// UTC date the daily counter was last reset, if ever.
    pub last_reset: Option<NaiveDate>,
}

impl BalanceView {
    /// Amount earned on `today`.
    ///
    /// A counter last reset on an earlier date is stale and counts as zero;
    /// the stored row is reset lazily on the next write.
    pub fn earned_on(&self, today: NaiveDate) -> i64 {
        match self.last_reset {
            Some(date) if date >= today => self.daily_earned,
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// LimitRequest
// ---------------------------------------------------------------------------

/// A balance change to be checked against the currency's caps.
#[derive(Clone, Debug)]
pub struct LimitRequest<'a> {
    pub account: &'a AccountId,
    pub currency: &'a CurrencyType,
    /// Signed amount; positive amounts earn, negative amounts spend.
    pub amount: i64,
    pub kind: EntryKind,
    pub balance: BalanceView,
    /// Current UTC date according to the ledger clock.
    pub today: NaiveDate,
}

impl LimitRequest<'_> {
    pub fn is_earn(&self) -> bool {
        self.amount > 0
    }
}

// ---------------------------------------------------------------------------
// DenyReason
// ---------------------------------------------------------------------------

/// Why a request was denied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DenyReason {
    DailyEarnCap {
        cap: i64,
        earned_today: i64,
        requested: i64,
    },
    HoldCap {
        cap: i64,
        balance_after: i64,
    },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyEarnCap {
                cap,
                earned_today,
                requested,
            } => write!(
                f,
                "daily earn cap {cap} exceeded: earned {earned_today} today, requested {requested}"
            ),
            Self::HoldCap { cap, balance_after } => {
                write!(f, "hold cap {cap} exceeded: balance would be {balance_after}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// StageDecision
// ---------------------------------------------------------------------------

/// The outcome of a single limit stage evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageDecision {
    /// The stage passed; proceed to the next stage.
    Pass,
    /// The stage failed; the request must be denied.
    Fail(DenyReason),
}

impl StageDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

/// Recorded result from a completed stage evaluation.
#[derive(Clone, Debug)]
pub struct StageResult {
    pub stage_name: String,
    pub passed: bool,
    pub reason: Option<DenyReason>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// LimitStage trait
// ---------------------------------------------------------------------------

/// A single evaluation stage in the limit pipeline.
///
/// The trait is object-safe and `Send + Sync` so stages can be stored in a
/// `Vec<Box<dyn LimitStage>>` shared between ledger writers.
pub trait LimitStage: Send + Sync {
    /// Human-readable name of this stage (e.g., "daily_earn", "hold_cap").
    fn name(&self) -> &str;

    fn evaluate(&self, request: &LimitRequest<'_>) -> Result<StageDecision, GateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, day).unwrap()
    }

    #[test]
    fn earned_on_same_day_is_counted() {
        let view = BalanceView {
            current: 40,
            daily_earned: 40,
            last_reset: Some(date(3)),
        };
        assert_eq!(view.earned_on(date(3)), 40);
    }

    #[test]
    fn stale_counter_reads_as_zero() {
        let view = BalanceView {
            current: 40,
            daily_earned: 40,
            last_reset: Some(date(2)),
        };
        assert_eq!(view.earned_on(date(3)), 0);
        assert_eq!(BalanceView::default().earned_on(date(3)), 0);
    }

    #[test]
    fn deny_reason_display() {
        let reason = DenyReason::HoldCap {
            cap: 100,
            balance_after: 120,
        };
        assert_eq!(reason.to_string(), "hold cap 100 exceeded: balance would be 120");
    }
}
