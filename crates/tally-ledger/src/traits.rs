use tally_types::{AccountId, CurrencyCode, CurrencyType, EntryId, Reference};

use crate::error::LedgerError;
use crate::records::{Balance, BalanceKey, EntryDraft, LedgerEntry};

/// Write boundary for ledger mutations.
pub trait LedgerWriter: Send + Sync {
    /// Price a draft against the current balance and commit it.
    ///
    /// Rejections (`InsufficientFunds`, `LimitExceeded`) are recorded as
    /// `failed` entries and still returned as errors.
    fn append(&self, draft: &EntryDraft) -> Result<LedgerEntry, LedgerError>;

    /// Append a compensating entry for `entry_id` and mark it `reversed`.
    fn reverse(&self, entry_id: EntryId, reason: &str) -> Result<LedgerEntry, LedgerError>;
}

/// Read boundary for queries, projection rebuilds, and audits.
pub trait LedgerReader: Send + Sync {
    fn get_entry(&self, id: EntryId) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Entries of one balance in creation order, failed attempts included.
    fn entries_for(
        &self,
        account: &AccountId,
        currency: &CurrencyCode,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    fn entries_for_account(&self, account: &AccountId) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Entries of the account created at or after `since_ms`, in commit order.
    fn entries_for_account_since(
        &self,
        account: &AccountId,
        since_ms: u64,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut entries = self.entries_for_account(account)?;
        entries.retain(|e| e.created.physical_ms >= since_ms);
        Ok(entries)
    }

    fn entries_by_reference(&self, reference: &Reference) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Every entry in commit order.
    fn all_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// The stored balance, if the key has ever been written.
    fn balance(
        &self,
        account: &AccountId,
        currency: &CurrencyCode,
    ) -> Result<Option<Balance>, LedgerError>;

    fn balances_for(&self, account: &AccountId) -> Result<Vec<Balance>, LedgerError>;

    /// Every key that has at least one entry.
    fn keys(&self) -> Result<Vec<BalanceKey>, LedgerError>;

    fn currency(&self, code: &CurrencyCode) -> Result<Option<CurrencyType>, LedgerError>;

    fn entry_count(&self) -> Result<usize, LedgerError>;
}
