use serde::{Deserialize, Serialize};
use tally_types::AccountId;

use crate::error::SettlementError;

/// Basis-point scale: 10 000 bps = 1.0.
pub const BPS_SCALE: i64 = 10_000;

/// Where the integer remainder of a payout split goes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Added to the house commission.
    #[default]
    House,
    /// Added to the first account of the top rank.
    TopRanked,
}

/// Economics of a game session payout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Reward pool multiplier over the collected fees, in bps.
    pub reward_multiplier_bps: u32,
    /// House commission taken from the pool, in bps.
    pub commission_bps: u32,
    /// Share of the remaining pool per finishing position, in bps. Must sum
    /// to 10 000; positions past the end of the table receive nothing.
    pub payout_table_bps: Vec<u32>,
    /// Platform account receiving the commission.
    pub house_account: AccountId,
    pub remainder_policy: RemainderPolicy,
    /// Attempts per compensating reversal when the ledger reports a
    /// retryable error.
    pub compensation_attempts: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            reward_multiplier_bps: 10_000,
            commission_bps: 1_000,
            payout_table_bps: vec![6_000, 3_000, 1_000],
            house_account: AccountId::new("house"),
            remainder_policy: RemainderPolicy::House,
            compensation_attempts: 3,
        }
    }
}

impl SettlementConfig {
    /// Winner takes the whole distributable pool.
    pub fn winner_takes_all() -> Self {
        Self {
            payout_table_bps: vec![10_000],
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.reward_multiplier_bps == 0 {
            return Err(SettlementError::InvalidConfig(
                "reward_multiplier_bps must be positive".into(),
            ));
        }
        if i64::from(self.commission_bps) > BPS_SCALE {
            return Err(SettlementError::InvalidConfig(format!(
                "commission_bps {} exceeds {BPS_SCALE}",
                self.commission_bps
            )));
        }
        let total: i64 = self.payout_table_bps.iter().map(|&b| i64::from(b)).sum();
        if total != BPS_SCALE {
            return Err(SettlementError::InvalidConfig(format!(
                "payout_table_bps sums to {total}, expected {BPS_SCALE}"
            )));
        }
        if self.house_account.as_str().is_empty() {
            return Err(SettlementError::InvalidConfig(
                "house_account must not be empty".into(),
            ));
        }
        if self.compensation_attempts == 0 {
            return Err(SettlementError::InvalidConfig(
                "compensation_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
