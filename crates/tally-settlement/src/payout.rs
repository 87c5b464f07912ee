//! Pure payout arithmetic. No ledger access.

use std::collections::{BTreeMap, HashSet};

use tally_types::AccountId;

use crate::config::{RemainderPolicy, SettlementConfig, BPS_SCALE};
use crate::error::SettlementError;
use crate::session::Credit;

/// Split of a reward pool between ranked accounts and the house.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payout {
    pub pool: i64,
    pub commission: i64,
    /// In ranking order. Zero-amount credits are omitted.
    pub credits: Vec<Credit>,
}

impl Payout {
    pub fn credited(&self) -> i64 {
        self.credits.iter().map(|c| c.amount).sum()
    }

    /// `sum(credits) + commission == pool`.
    pub fn is_balanced(&self) -> bool {
        self.credited().checked_add(self.commission) == Some(self.pool)
    }

    pub fn ensure_balanced(&self) -> Result<(), SettlementError> {
        if self.is_balanced() && self.credits.iter().all(|c| c.amount > 0) {
            Ok(())
        } else {
            Err(SettlementError::Unbalanced {
                pool: self.pool,
                credits: self.credited(),
                commission: self.commission,
            })
        }
    }
}

/// Group a best-first ranking into ranks. Neighbours with equal scores share
/// a rank; an account without a score never ties.
pub fn rank_groups(
    ranking: &[AccountId],
    scores: &BTreeMap<AccountId, i64>,
) -> Vec<Vec<AccountId>> {
    let mut groups: Vec<Vec<AccountId>> = Vec::new();
    let mut previous: Option<i64> = None;
    for account in ranking {
        let score = scores.get(account).copied();
        let tied = matches!((previous, score), (Some(prev), Some(current)) if prev == current);
        match groups.last_mut() {
            Some(group) if tied => group.push(account.clone()),
            _ => groups.push(vec![account.clone()]),
        }
        previous = score;
    }
    groups
}

/// Check a final ranking against the session's participants.
pub fn validate_ranking(
    ranking: &[AccountId],
    participants: &[AccountId],
) -> Result<(), SettlementError> {
    let mut seen = HashSet::new();
    for account in ranking {
        if !participants.contains(account) {
            return Err(SettlementError::InvalidSession(format!(
                "{account} is ranked but did not participate"
            )));
        }
        if !seen.insert(account) {
            return Err(SettlementError::InvalidSession(format!(
                "{account} is ranked twice"
            )));
        }
    }
    Ok(())
}

/// Compute the payout for `collected` fees over ranked groups.
///
/// A group occupying positions `p..p+n` splits the table shares of those
/// positions evenly. Integer remainders go where `remainder_policy` says.
pub fn compute(
    collected: i64,
    groups: &[Vec<AccountId>],
    config: &SettlementConfig,
) -> Result<Payout, SettlementError> {
    let pool = scale(collected, i64::from(config.reward_multiplier_bps), "pool")?;
    let mut commission = scale(pool, i64::from(config.commission_bps), "commission")?;
    let distributable = pool - commission;

    let mut credits = Vec::new();
    let mut position = 0usize;
    for group in groups.iter().filter(|g| !g.is_empty()) {
        let share_bps: i64 = (position..position + group.len())
            .map(|p| config.payout_table_bps.get(p).map_or(0, |&b| i64::from(b)))
            .sum();
        position += group.len();

        let group_amount = scale(distributable, share_bps, "rank share")?;
        let members = i64::try_from(group.len()).map_err(|_| SettlementError::Overflow("rank size"))?;
        let each = group_amount / members;
        credits.extend(group.iter().map(|account| Credit {
            account: account.clone(),
            amount: each,
        }));
    }

    let credited: i64 = credits.iter().map(|c| c.amount).sum();
    let remainder = distributable - credited;
    match (config.remainder_policy, credits.first_mut()) {
        (RemainderPolicy::TopRanked, Some(top)) => top.amount += remainder,
        _ => commission += remainder,
    }
    credits.retain(|c| c.amount > 0);

    Ok(Payout {
        pool,
        commission,
        credits,
    })
}

fn scale(amount: i64, bps: i64, what: &'static str) -> Result<i64, SettlementError> {
    let scaled = i128::from(amount) * i128::from(bps) / i128::from(BPS_SCALE);
    i64::try_from(scaled).map_err(|_| SettlementError::Overflow(what))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn accounts(names: &[&str]) -> Vec<AccountId> {
        names.iter().map(|n| AccountId::new(*n)).collect()
    }

    fn singles(names: &[&str]) -> Vec<Vec<AccountId>> {
        names.iter().map(|n| vec![AccountId::new(*n)]).collect()
    }

    // -----------------------------------------------------------------------
    // 1. Basic splits
    // -----------------------------------------------------------------------

    #[test]
    fn winner_takes_all_with_commission() {
        let payout = compute(400, &singles(&["a", "b", "c", "d"]), &SettlementConfig::winner_takes_all()).unwrap();
        assert_eq!(payout.pool, 400);
        assert_eq!(payout.commission, 40);
        assert_eq!(
            payout.credits,
            vec![Credit {
                account: AccountId::new("a"),
                amount: 360
            }]
        );
        assert!(payout.is_balanced());
    }

    #[test]
    fn table_split_over_three_positions() {
        let payout = compute(400, &singles(&["a", "b", "c", "d"]), &SettlementConfig::default()).unwrap();
        let amounts: Vec<i64> = payout.credits.iter().map(|c| c.amount).collect();
        assert_eq!(amounts, vec![216, 108, 36]);
        assert_eq!(payout.commission, 40);
        payout.ensure_balanced().unwrap();
    }

    #[test]
    fn multiplier_scales_pool() {
        let config = SettlementConfig {
            reward_multiplier_bps: 15_000,
            ..SettlementConfig::winner_takes_all()
        };
        let payout = compute(200, &singles(&["a", "b"]), &config).unwrap();
        assert_eq!(payout.pool, 300);
        assert_eq!(payout.commission, 30);
        assert_eq!(payout.credited(), 270);
    }

    // -----------------------------------------------------------------------
    // 2. Ties and remainders
    // -----------------------------------------------------------------------

    #[test]
    fn three_way_tie_remainder_to_house() {
        let config = SettlementConfig {
            commission_bps: 1_500,
            ..SettlementConfig::winner_takes_all()
        };
        let groups = vec![accounts(&["a", "b", "c"]), accounts(&["d"])];
        let payout = compute(400, &groups, &config).unwrap();
        assert_eq!(payout.credited(), 339);
        assert_eq!(payout.commission, 61);
        assert!(payout.credits.iter().all(|c| c.amount == 113));
        assert!(payout.is_balanced());
    }

    #[test]
    fn three_way_tie_remainder_to_top() {
        let config = SettlementConfig {
            commission_bps: 1_500,
            remainder_policy: RemainderPolicy::TopRanked,
            ..SettlementConfig::winner_takes_all()
        };
        let groups = vec![accounts(&["a", "b", "c"]), accounts(&["d"])];
        let payout = compute(400, &groups, &config).unwrap();
        assert_eq!(payout.commission, 60);
        assert_eq!(payout.credits[0].amount, 114);
        assert_eq!(payout.credits[1].amount, 113);
        assert!(payout.is_balanced());
    }

    #[test]
    fn tie_shares_occupied_positions() {
        // Positions 2 and 3 (3000 + 1000 bps) split between b and c.
        let groups = vec![accounts(&["a"]), accounts(&["b", "c"]), accounts(&["d"])];
        let payout = compute(400, &groups, &SettlementConfig::default()).unwrap();
        let amounts: Vec<i64> = payout.credits.iter().map(|c| c.amount).collect();
        assert_eq!(amounts, vec![216, 72, 72]);
        assert!(payout.is_balanced());
    }

    #[test]
    fn unfilled_positions_fall_to_house() {
        let payout = compute(200, &singles(&["a"]), &SettlementConfig::default()).unwrap();
        assert_eq!(payout.credited(), 108);
        assert_eq!(payout.commission, 92);
    }

    #[test]
    fn rank_groups_from_scores() {
        let ranking = accounts(&["a", "b", "c", "d"]);
        let scores: BTreeMap<AccountId, i64> = [("a", 9), ("b", 7), ("c", 7), ("d", 1)]
            .into_iter()
            .map(|(n, s)| (AccountId::new(n), s))
            .collect();
        let groups = rank_groups(&ranking, &scores);
        assert_eq!(groups, vec![accounts(&["a"]), accounts(&["b", "c"]), accounts(&["d"])]);

        let unscored = rank_groups(&ranking, &BTreeMap::new());
        assert_eq!(unscored.len(), 4);
    }

    // -----------------------------------------------------------------------
    // 3. Validation
    // -----------------------------------------------------------------------

    #[test]
    fn ranking_must_be_participants() {
        let participants = accounts(&["a", "b"]);
        validate_ranking(&accounts(&["b", "a"]), &participants).unwrap();
        assert!(matches!(
            validate_ranking(&accounts(&["a", "z"]), &participants),
            Err(SettlementError::InvalidSession(_))
        ));
        assert!(matches!(
            validate_ranking(&accounts(&["a", "a"]), &participants),
            Err(SettlementError::InvalidSession(_))
        ));
    }

    #[test]
    fn unbalanced_payout_is_reported() {
        let payout = Payout {
            pool: 100,
            commission: 10,
            credits: vec![Credit {
                account: AccountId::new("a"),
                amount: 80,
            }],
        };
        assert_eq!(
            payout.ensure_balanced(),
            Err(SettlementError::Unbalanced {
                pool: 100,
                credits: 80,
                commission: 10
            })
        );
    }

    // -----------------------------------------------------------------------
    // 4. Conservation property
    // -----------------------------------------------------------------------

    fn table() -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(1u32..100, 1..6).prop_map(|weights| {
            let total: u32 = weights.iter().sum();
            let mut table: Vec<u32> = weights.iter().map(|w| w * 10_000 / total).collect();
            let assigned: u32 = table.iter().sum();
            table[0] += 10_000 - assigned;
            table
        })
    }

    proptest! {
        #[test]
        fn payout_conserves_pool(
            collected in 1i64..1_000_000_000,
            multiplier in 1u32..30_000,
            commission in 0u32..=10_000,
            table in table(),
            sizes in prop::collection::vec(1usize..4, 1..8),
            top in any::<bool>(),
        ) {
            let config = SettlementConfig {
                reward_multiplier_bps: multiplier,
                commission_bps: commission,
                payout_table_bps: table,
                remainder_policy: if top { RemainderPolicy::TopRanked } else { RemainderPolicy::House },
                ..Default::default()
            };
            prop_assert!(config.validate().is_ok());

            let mut n = 0;
            let groups: Vec<Vec<AccountId>> = sizes
                .iter()
                .map(|&size| {
                    (0..size)
                        .map(|_| {
                            n += 1;
                            AccountId::new(format!("p{n}"))
                        })
                        .collect()
                })
                .collect();

            let payout = compute(collected, &groups, &config).unwrap();
            prop_assert!(payout.is_balanced());
            prop_assert!(payout.commission >= 0);
            prop_assert!(payout.credits.iter().all(|c| c.amount > 0));
        }
    }
}
