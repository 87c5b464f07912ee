use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tally_crypto::{BalanceMaterial, EntryMaterial, IntegrityGuard, IntegrityHash};
use tally_gate::BalanceView;
use tally_types::{
    AccountId, CurrencyCode, EntryId, EntryKind, EntryStatus, Reference, Timestamp,
};

// ---------------------------------------------------------------------------
// BalanceKey
// ---------------------------------------------------------------------------

/// The unit of exclusivity: one balance per account per currency.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub account: AccountId,
    pub currency: CurrencyCode,
}

impl BalanceKey {
    pub fn new(account: AccountId, currency: CurrencyCode) -> Self {
        Self { account, currency }
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.currency)
    }
}

// ---------------------------------------------------------------------------
// EntryDraft
// ---------------------------------------------------------------------------

/// A requested balance change, before the ledger has priced it against the
/// current balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub account: AccountId,
    pub currency: CurrencyCode,
    /// Signed amount; positive credits, negative debits.
    pub amount: i64,
    pub kind: EntryKind,
    pub reference: Reference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl EntryDraft {
    pub fn new(
        account: AccountId,
        currency: CurrencyCode,
        amount: i64,
        kind: EntryKind,
        reference: Reference,
    ) -> Self {
        Self {
            account,
            currency,
            amount,
            kind,
            reference,
            memo: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.account.clone(), self.currency.clone())
    }
}

// ---------------------------------------------------------------------------
// LedgerEntry
// ---------------------------------------------------------------------------

/// One immutable economic event.
///
/// Only `status`, `reversal_id`, and `processed` ever change after the entry
/// is stored; the amount and balance fields are covered by `integrity_hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account: AccountId,
    pub currency: CurrencyCode,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub kind: EntryKind,
    pub reference: Reference,
    pub status: EntryStatus,
    /// Entry this one compensates (reversals only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntryId>,
    /// Creation time of the compensated entry, so replay can tell whether
    /// it still counts toward the current day's earnings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_created: Option<Timestamp>,
    /// Reversal entry that compensated this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversal_id: Option<EntryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub integrity_hash: IntegrityHash,
    pub created: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed: Option<Timestamp>,
}

impl LedgerEntry {
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.account.clone(), self.currency.clone())
    }

    /// The fields covered by the integrity hash.
    pub fn material(&self) -> EntryMaterial<'_> {
        EntryMaterial {
            account: &self.account,
            currency: &self.currency,
            amount: self.amount,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            created: self.created,
            parent_created: self.parent_created,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.status.is_applied()
    }

    pub fn is_credit(&self) -> bool {
        self.amount > 0
    }

    /// `balance_after - balance_before == amount`.
    pub fn is_consistent(&self) -> bool {
        self.balance_before.checked_add(self.amount) == Some(self.balance_after)
    }

    pub(crate) fn sign(&mut self, guard: &IntegrityGuard) {
        self.integrity_hash = guard.sign_entry(&self.material());
    }

    pub fn verify(&self, guard: &IntegrityGuard) -> bool {
        guard.verify_entry(&self.material(), &self.integrity_hash)
    }
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// Cached balance of one account in one currency.
///
/// Derived from the entry log: replaying every applied entry through
/// [`Balance::apply`] reproduces it field for field, hash included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account: AccountId,
    pub currency: CurrencyCode,
    pub current: i64,
    pub lifetime_earned: i64,
    pub lifetime_spent: i64,
    /// Earned since `last_reset`.
    pub daily_earned: i64,
    pub last_reset: Option<NaiveDate>,
    pub last_modified: Timestamp,
    pub integrity_hash: IntegrityHash,
}

impl Balance {
    /// A zero balance that has never been written.
    pub fn open(key: &BalanceKey) -> Self {
        Self {
            account: key.account.clone(),
            currency: key.currency.clone(),
            current: 0,
            lifetime_earned: 0,
            lifetime_spent: 0,
            daily_earned: 0,
            last_reset: None,
            last_modified: Timestamp::zero(),
            integrity_hash: IntegrityHash::UNSIGNED,
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.account.clone(), self.currency.clone())
    }

    pub fn material(&self) -> BalanceMaterial<'_> {
        BalanceMaterial {
            account: &self.account,
            currency: &self.currency,
            current: self.current,
            lifetime_earned: self.lifetime_earned,
            lifetime_spent: self.lifetime_spent,
            daily_earned: self.daily_earned,
            last_reset_day: self.last_reset.map(|d| d.num_days_from_ce()),
            last_modified: self.last_modified,
        }
    }

    pub fn verify(&self, guard: &IntegrityGuard) -> bool {
        guard.verify_balance(&self.material(), &self.integrity_hash)
    }

    pub fn view(&self) -> BalanceView {
        BalanceView {
            current: self.current,
            daily_earned: self.daily_earned,
            last_reset: self.last_reset,
        }
    }

    /// Earned on `today`, treating a counter from an earlier day as zero.
    pub fn earned_on(&self, today: NaiveDate) -> i64 {
        self.view().earned_on(today)
    }

    /// Apply one entry and re-sign.
    ///
    /// Used both by the append commit and by replay, so the two paths cannot
    /// drift apart. The daily counter resets when the entry falls on a later
    /// UTC day than the last reset. A reversal unwinds the lifetime counter
    /// its original moved; the daily counter is only unwound when the
    /// original was earned on the current day.
    pub fn apply(&mut self, entry: &LedgerEntry, guard: &IntegrityGuard) {
        let day = entry.created.utc_date();
        match self.last_reset {
            Some(last) if last >= day => {}
            _ => {
                self.daily_earned = 0;
                self.last_reset = Some(day);
            }
        }

        let magnitude = entry.amount.saturating_abs();
        match (entry.kind, entry.amount > 0) {
            (EntryKind::Reversal, false) => {
                self.lifetime_earned = self.lifetime_earned.saturating_sub(magnitude).max(0);
                if entry.parent_created.map(|t| t.utc_date()) == self.last_reset {
                    self.daily_earned = self.daily_earned.saturating_sub(magnitude).max(0);
                }
            }
            (EntryKind::Reversal, true) => {
                self.lifetime_spent = self.lifetime_spent.saturating_sub(magnitude).max(0);
            }
            (_, true) => {
                self.lifetime_earned = self.lifetime_earned.saturating_add(magnitude);
                self.daily_earned = self.daily_earned.saturating_add(magnitude);
            }
            (_, false) => {
                self.lifetime_spent = self.lifetime_spent.saturating_add(magnitude);
            }
        }

        self.current = entry.balance_after;
        self.last_modified = entry.created;
        self.integrity_hash = guard.sign_balance(&self.material());
    }
}
