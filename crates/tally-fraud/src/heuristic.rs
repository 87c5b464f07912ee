use std::collections::BTreeMap;
use std::time::Duration;

use tally_ledger::LedgerReader;
use tally_types::{AccountId, CurrencyCode, EntryKind, EntryStatus};
use tracing::debug;

use crate::activity::GameActivity;
use crate::config::FraudConfig;
use crate::error::FraudError;
use crate::flags::{FlagSet, FraudFlag};

/// Threshold checks over an account's trailing activity.
///
/// Evaluation only reads: it never blocks or alters ledger operations.
#[derive(Clone, Debug)]
pub struct FraudHeuristic {
    config: FraudConfig,
}

impl FraudHeuristic {
    pub fn new(config: FraudConfig) -> Result<Self, FraudError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    /// Flags for `account` over the window ending at `now_ms`.
    pub fn evaluate<R: LedgerReader + ?Sized>(
        &self,
        reader: &R,
        activity: &dyn GameActivity,
        account: &AccountId,
        window: Duration,
        now_ms: u64,
    ) -> Result<FlagSet, FraudError> {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let since = now_ms.saturating_sub(window_ms);
        let mut set = FlagSet::new(account.clone(), window.as_secs());

        let entries = reader.entries_for_account_since(account, since)?;
        let recent: Vec<_> = entries
            .iter()
            .filter(|e| e.created.physical_ms <= now_ms)
            .collect();

        let purchases = recent
            .iter()
            .filter(|e| e.kind == EntryKind::Purchase && e.amount > 0 && e.is_applied())
            .count();
        if let Some(threshold) = at_or_above(purchases, self.config.rapid_purchases) {
            set.push(FraudFlag::RapidPurchases {
                count: purchases,
                threshold,
            });
        }

        let mut earned: BTreeMap<&CurrencyCode, i64> = BTreeMap::new();
        for entry in recent.iter().filter(|e| {
            matches!(e.kind, EntryKind::Reward | EntryKind::GameSettlement)
                && e.amount > 0
                && e.status == EntryStatus::Completed
        }) {
            let total = earned.entry(&entry.currency).or_insert(0);
            *total = total.saturating_add(entry.amount);
        }
        if self.config.earn_velocity > 0 {
            if let Some((currency, &total)) = earned.iter().max_by_key(|(_, total)| **total) {
                if total >= self.config.earn_velocity {
                    set.push(FraudFlag::EarnVelocity {
                        currency: (*currency).clone(),
                        earned: total,
                        threshold: self.config.earn_velocity,
                    });
                }
            }
        }

        if self.config.fast_completions > 0 {
            let fast = activity
                .completions_since(account, since)?
                .iter()
                .filter(|s| s.completed_at_ms <= now_ms)
                .filter(|s| s.duration_ms < self.config.fast_completion_floor_ms)
                .count();
            if fast >= self.config.fast_completions {
                set.push(FraudFlag::FastCompletions {
                    count: fast,
                    floor_ms: self.config.fast_completion_floor_ms,
                });
            }
        }

        let reversals = recent.iter().filter(|e| e.kind == EntryKind::Reversal).count();
        if let Some(threshold) = at_or_above(reversals, self.config.reversal_churn) {
            set.push(FraudFlag::ReversalChurn {
                count: reversals,
                threshold,
            });
        }

        let rejections = recent
            .iter()
            .filter(|e| e.status == EntryStatus::Failed)
            .count();
        if let Some(threshold) = at_or_above(rejections, self.config.repeated_rejections) {
            set.push(FraudFlag::RepeatedRejections {
                count: rejections,
                threshold,
            });
        }

        debug!(
            account = %account,
            window_secs = window.as_secs(),
            entries = recent.len(),
            flags = set.len(),
            "fraud heuristics evaluated"
        );
        Ok(set)
    }
}

fn at_or_above(count: usize, threshold: usize) -> Option<usize> {
    (threshold > 0 && count >= threshold).then_some(threshold)
}
