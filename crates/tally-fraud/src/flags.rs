use std::fmt;

use serde::{Deserialize, Serialize};
use tally_types::{AccountId, CurrencyCode};

/// One suspicious pattern found in an account's recent activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum FraudFlag {
    RapidPurchases { count: usize, threshold: usize },
    EarnVelocity {
        currency: CurrencyCode,
        earned: i64,
        threshold: i64,
    },
    FastCompletions { count: usize, floor_ms: u64 },
    ReversalChurn { count: usize, threshold: usize },
    RepeatedRejections { count: usize, threshold: usize },
}

impl FraudFlag {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RapidPurchases { .. } => "rapid_purchases",
            Self::EarnVelocity { .. } => "earn_velocity",
            Self::FastCompletions { .. } => "fast_completions",
            Self::ReversalChurn { .. } => "reversal_churn",
            Self::RepeatedRejections { .. } => "repeated_rejections",
        }
    }
}

impl fmt::Display for FraudFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RapidPurchases { count, threshold } => {
                write!(f, "{count} purchases (threshold {threshold})")
            }
            Self::EarnVelocity {
                currency,
                earned,
                threshold,
            } => write!(f, "earned {earned} {currency} (threshold {threshold})"),
            Self::FastCompletions { count, floor_ms } => {
                write!(f, "{count} sessions completed under {floor_ms}ms")
            }
            Self::ReversalChurn { count, threshold } => {
                write!(f, "{count} reversals (threshold {threshold})")
            }
            Self::RepeatedRejections { count, threshold } => {
                write!(f, "{count} rejected entries (threshold {threshold})")
            }
        }
    }
}

/// Flags raised for one account over one trailing window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSet {
    pub account: AccountId,
    pub window_secs: u64,
    pub flags: Vec<FraudFlag>,
}

impl FlagSet {
    pub fn new(account: AccountId, window_secs: u64) -> Self {
        Self {
            account,
            window_secs,
            flags: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f.name() == name)
    }

    /// `name: detail` per flag, as forwarded to the audit sink.
    pub fn describe(&self) -> Vec<String> {
        self.flags
            .iter()
            .map(|f| format!("{}: {f}", f.name()))
            .collect()
    }

    pub(crate) fn push(&mut self, flag: FraudFlag) {
        self.flags.push(flag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_names_each_flag() {
        let mut set = FlagSet::new(AccountId::new("mallory"), 60);
        set.push(FraudFlag::ReversalChurn {
            count: 4,
            threshold: 3,
        });
        assert!(set.contains("reversal_churn"));
        assert!(!set.contains("earn_velocity"));
        assert_eq!(set.describe(), vec!["reversal_churn: 4 reversals (threshold 3)"]);
    }
}
