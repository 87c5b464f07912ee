use std::collections::BTreeMap;

use tally_crypto::IntegrityGuard;
use tally_types::{AccountId, CurrencyCode};

use crate::error::LedgerError;
use crate::records::{Balance, BalanceKey, LedgerEntry};
use crate::traits::LedgerReader;

/// Deterministic balance projection over the entry log.
///
/// The stored balance is a cache. [`BalanceProjection::rebuild`] recomputes
/// it from the applied entries of the key in creation order; `failed`
/// entries are skipped.
pub struct BalanceProjection;

impl BalanceProjection {
    /// The current balance; a key that was never written reads as zero.
    pub fn get<R: LedgerReader>(
        reader: &R,
        account: &AccountId,
        currency: &CurrencyCode,
    ) -> Result<Balance, LedgerError> {
        Ok(reader.balance(account, currency)?.unwrap_or_else(|| {
            Balance::open(&BalanceKey::new(account.clone(), currency.clone()))
        }))
    }

    /// Fold applied entries into a fresh balance.
    pub fn replay<'a>(
        key: &BalanceKey,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
        guard: &IntegrityGuard,
    ) -> Balance {
        let mut balance = Balance::open(key);
        for entry in entries.into_iter().filter(|e| e.is_applied()) {
            balance.apply(entry, guard);
        }
        balance
    }

    pub fn rebuild<R: LedgerReader>(
        reader: &R,
        guard: &IntegrityGuard,
        account: &AccountId,
        currency: &CurrencyCode,
    ) -> Result<Balance, LedgerError> {
        let key = BalanceKey::new(account.clone(), currency.clone());
        let entries = reader.entries_for(account, currency)?;
        Ok(Self::replay(&key, &entries, guard))
    }

    /// Rebuild every key from a single pass over the log.
    pub fn rebuild_all<R: LedgerReader>(
        reader: &R,
        guard: &IntegrityGuard,
    ) -> Result<BTreeMap<BalanceKey, Balance>, LedgerError> {
        let mut balances: BTreeMap<BalanceKey, Balance> = BTreeMap::new();
        for entry in reader.all_entries()?.iter().filter(|e| e.is_applied()) {
            let key = entry.key();
            balances
                .entry(key.clone())
                .or_insert_with(|| Balance::open(&key))
                .apply(entry, guard);
        }
        Ok(balances)
    }

    /// Compare the stored balance with a rebuild.
    ///
    /// Returns the balance when both agree field for field, otherwise
    /// `ProjectionDivergence` naming the first differing field.
    pub fn verify<R: LedgerReader>(
        reader: &R,
        guard: &IntegrityGuard,
        account: &AccountId,
        currency: &CurrencyCode,
    ) -> Result<Balance, LedgerError> {
        let stored = Self::get(reader, account, currency)?;
        let rebuilt = Self::rebuild(reader, guard, account, currency)?;
        match first_difference(&stored, &rebuilt) {
            None => Ok(stored),
            Some(detail) => Err(LedgerError::ProjectionDivergence {
                account: account.clone(),
                currency: currency.clone(),
                detail,
            }),
        }
    }
}

fn first_difference(stored: &Balance, rebuilt: &Balance) -> Option<String> {
    let field = if stored.current != rebuilt.current {
        "current"
    } else if stored.lifetime_earned != rebuilt.lifetime_earned {
        "lifetime_earned"
    } else if stored.lifetime_spent != rebuilt.lifetime_spent {
        "lifetime_spent"
    } else if stored.daily_earned != rebuilt.daily_earned {
        "daily_earned"
    } else if stored.last_reset != rebuilt.last_reset {
        "last_reset"
    } else if stored.last_modified != rebuilt.last_modified {
        "last_modified"
    } else if stored.integrity_hash != rebuilt.integrity_hash {
        "integrity_hash"
    } else {
        return None;
    };
    Some(format!("{field} differs from replay"))
}
