use std::collections::{BTreeMap, HashMap};

use tally_crypto::IntegrityGuard;
use tally_types::{EntryId, EntryKind, EntryStatus};

use crate::error::LedgerError;
use crate::projection::BalanceProjection;
use crate::records::{BalanceKey, LedgerEntry};
use crate::traits::LedgerReader;

/// Result of a full ledger audit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub entry_count: usize,
    pub key_count: usize,
    pub hashes_valid: bool,
    pub chains_continuous: bool,
    pub reversals_linked: bool,
    pub projection_consistent: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific problem found during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub key: BalanceKey,
    pub entry: Option<EntryId>,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    EntryHashMismatch,
    ArithmeticMismatch,
    ChainBreak,
    PendingEntry,
    NegativeBalance,
    BrokenReversalLink,
    ReversalDepth,
    BalanceHashMismatch,
    ProjectionDivergence,
}

/// Whole-ledger auditor.
///
/// Checks every entry hash and balance equation, that applied entries of
/// each key form a continuous chain, that reversal links agree in both
/// directions, and that stored balances equal a replay of the log.
pub struct LedgerAuditor;

impl LedgerAuditor {
    pub fn validate<R: LedgerReader>(
        reader: &R,
        guard: &IntegrityGuard,
    ) -> Result<ValidationReport, LedgerError> {
        let entries = reader.all_entries()?;
        let by_id: HashMap<EntryId, &LedgerEntry> = entries.iter().map(|e| (e.id, e)).collect();
        let mut violations = Vec::new();
        let mut running: BTreeMap<BalanceKey, i64> = BTreeMap::new();

        for entry in &entries {
            let key = entry.key();
            let mut flag = |kind: ViolationKind, description: String| {
                violations.push(Violation {
                    key: key.clone(),
                    entry: Some(entry.id),
                    kind,
                    description,
                });
            };

            if !entry.verify(guard) {
                flag(ViolationKind::EntryHashMismatch, "entry hash does not match".into());
            }
            if !entry.is_consistent() {
                flag(
                    ViolationKind::ArithmeticMismatch,
                    format!(
                        "{} + {} != {}",
                        entry.balance_before, entry.amount, entry.balance_after
                    ),
                );
            }
            if entry.status == EntryStatus::Pending {
                flag(ViolationKind::PendingEntry, "entry left pending".into());
            }

            if entry.is_applied() {
                let previous = running.entry(key.clone()).or_insert(0);
                if entry.balance_before != *previous {
                    flag(
                        ViolationKind::ChainBreak,
                        format!("starts at {} after {}", entry.balance_before, previous),
                    );
                }
                *previous = entry.balance_after;

                let allow_negative = reader
                    .currency(&entry.currency)?
                    .is_some_and(|c| c.allow_negative);
                if entry.balance_after < 0 && !allow_negative {
                    flag(
                        ViolationKind::NegativeBalance,
                        format!("balance {} below zero", entry.balance_after),
                    );
                }
            }

            match (entry.status, entry.reversal_id) {
                (EntryStatus::Reversed, Some(rid)) => {
                    if by_id.get(&rid).and_then(|r| r.parent_id) != Some(entry.id) {
                        flag(
                            ViolationKind::BrokenReversalLink,
                            format!("reversal {rid} does not point back"),
                        );
                    }
                }
                (EntryStatus::Reversed, None) => flag(
                    ViolationKind::BrokenReversalLink,
                    "reversed without a reversal link".into(),
                ),
                (_, Some(rid)) => flag(
                    ViolationKind::BrokenReversalLink,
                    format!("linked to reversal {rid} but status is {}", entry.status),
                ),
                (_, None) => {}
            }

            if let Some(parent) = entry.parent_id.and_then(|p| by_id.get(&p)) {
                if parent.kind == EntryKind::Reversal {
                    flag(
                        ViolationKind::ReversalDepth,
                        format!("reverses reversal {}", parent.id),
                    );
                }
                if entry.parent_created != Some(parent.created) {
                    flag(
                        ViolationKind::BrokenReversalLink,
                        format!("parent time does not match {}", parent.id),
                    );
                }
                if entry.is_applied() && parent.reversal_id != Some(entry.id) {
                    flag(
                        ViolationKind::BrokenReversalLink,
                        format!("parent {} does not link back", parent.id),
                    );
                }
            } else if entry.parent_id.is_some() {
                flag(
                    ViolationKind::BrokenReversalLink,
                    "parent entry missing".into(),
                );
            }
        }

        let keys = reader.keys()?;
        for key in &keys {
            if let Some(stored) = reader.balance(&key.account, &key.currency)? {
                if !stored.verify(guard) {
                    violations.push(Violation {
                        key: key.clone(),
                        entry: None,
                        kind: ViolationKind::BalanceHashMismatch,
                        description: "stored balance hash does not match".into(),
                    });
                }
            }
            if let Err(LedgerError::ProjectionDivergence { detail, .. }) =
                BalanceProjection::verify(reader, guard, &key.account, &key.currency)
            {
                violations.push(Violation {
                    key: key.clone(),
                    entry: None,
                    kind: ViolationKind::ProjectionDivergence,
                    description: detail,
                });
            }
        }

        let has = |kinds: &[ViolationKind]| violations.iter().any(|v| kinds.contains(&v.kind));
        Ok(ValidationReport {
            entry_count: entries.len(),
            key_count: keys.len(),
            hashes_valid: !has(&[
                ViolationKind::EntryHashMismatch,
                ViolationKind::BalanceHashMismatch,
            ]),
            chains_continuous: !has(&[ViolationKind::ChainBreak, ViolationKind::ArithmeticMismatch]),
            reversals_linked: !has(&[
                ViolationKind::BrokenReversalLink,
                ViolationKind::ReversalDepth,
            ]),
            projection_consistent: !has(&[ViolationKind::ProjectionDivergence]),
            violations,
        })
    }
}
