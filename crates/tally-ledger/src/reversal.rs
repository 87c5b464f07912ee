use tally_types::{EntryKind, EntryStatus};

use crate::error::LedgerError;
use crate::records::{EntryDraft, LedgerEntry};

/// Reversal rules.
///
/// Only `completed` entries of a reversible kind without an existing
/// reversal link can be reversed. Reversals themselves are final, so a
/// compensation chain never grows past depth one.
pub struct ReversalPolicy;

impl ReversalPolicy {
    pub fn check(entry: &LedgerEntry) -> Result<(), LedgerError> {
        let refuse = |reason: &str| {
            Err(LedgerError::NotReversible {
                entry: entry.id,
                reason: reason.to_string(),
            })
        };

        if !entry.kind.is_reversible() {
            return refuse("reversal entries cannot be reversed");
        }
        if entry.reversal_id.is_some() {
            return refuse("entry already has a reversal");
        }
        match entry.status {
            EntryStatus::Completed => Ok(()),
            EntryStatus::Reversed => refuse("entry is already reversed"),
            EntryStatus::Failed => refuse("failed entries have no effect to reverse"),
            EntryStatus::Pending => refuse("entry is still pending"),
        }
    }

    /// The amount that undoes `entry`.
    pub fn compensating_amount(entry: &LedgerEntry) -> Result<i64, LedgerError> {
        Self::check(entry)?;
        entry
            .amount
            .checked_neg()
            .ok_or_else(|| LedgerError::InvalidAmount(format!("cannot negate {}", entry.amount)))
    }

    /// The compensating draft for `entry`: same key and reference, negated
    /// amount, the reason as memo.
    pub fn draft(entry: &LedgerEntry, reason: &str) -> Result<EntryDraft, LedgerError> {
        let amount = Self::compensating_amount(entry)?;
        Ok(EntryDraft::new(
            entry.account.clone(),
            entry.currency.clone(),
            amount,
            EntryKind::Reversal,
            entry.reference.clone(),
        )
        .with_memo(reason))
    }
}

#[cfg(test)]
mod tests {
    use tally_crypto::IntegrityHash;
    use tally_types::{AccountId, CurrencyCode, EntryId, Reference, Timestamp};

    use super::*;

    fn entry(kind: EntryKind, status: EntryStatus) -> LedgerEntry {
        LedgerEntry {
            id: EntryId::new(),
            account: AccountId::new("alice"),
            currency: CurrencyCode::parse("COIN").unwrap(),
            amount: 25,
            balance_before: 0,
            balance_after: 25,
            kind,
            reference: Reference::purchase("order-1"),
            status,
            parent_id: None,
            parent_created: None,
            reversal_id: None,
            memo: None,
            integrity_hash: IntegrityHash::UNSIGNED,
            created: Timestamp::zero(),
            processed: None,
        }
    }

    #[test]
    fn completed_entry_is_reversible() {
        let original = entry(EntryKind::Purchase, EntryStatus::Completed);
        let draft = ReversalPolicy::draft(&original, "chargeback").unwrap();
        assert_eq!(draft.amount, -25);
        assert_eq!(draft.kind, EntryKind::Reversal);
        assert_eq!(draft.reference, original.reference);
        assert_eq!(draft.memo.as_deref(), Some("chargeback"));
    }

    #[test]
    fn reversal_of_reversal_refused() {
        let reversal = entry(EntryKind::Reversal, EntryStatus::Completed);
        assert!(matches!(
            ReversalPolicy::check(&reversal),
            Err(LedgerError::NotReversible { .. })
        ));
    }

    #[test]
    fn non_completed_or_linked_refused() {
        for status in [EntryStatus::Failed, EntryStatus::Reversed, EntryStatus::Pending] {
            assert!(ReversalPolicy::check(&entry(EntryKind::Reward, status)).is_err());
        }

        let mut linked = entry(EntryKind::Reward, EntryStatus::Completed);
        linked.reversal_id = Some(EntryId::new());
        assert!(ReversalPolicy::check(&linked).is_err());
    }
}
