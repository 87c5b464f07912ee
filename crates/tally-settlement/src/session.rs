use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tally_types::{AccountId, CurrencyCode, EntryId, SessionId};

/// Lifecycle of a settled game session.
///
/// `Pending -> Collecting -> Distributing -> Settled`, with `Failed`
/// reachable from any non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    Pending,
    Collecting,
    Distributing,
    Settled,
    Failed,
}

impl SettlementState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Collecting => "collecting",
            Self::Distributing => "distributing",
            Self::Settled => "settled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SettlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payout to a ranked account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    pub account: AccountId,
    pub amount: i64,
}

/// Everything the coordinator knows about a session's money movement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub session: SessionId,
    pub state: SettlementState,
    pub currency: CurrencyCode,
    pub participants: Vec<AccountId>,
    pub entry_fee: i64,
    /// Sum of the fee debits that were applied.
    pub collected: i64,
    pub pool: i64,
    pub commission: i64,
    pub credits: Vec<Credit>,
    /// Applied legs (fees, credits, commission) in application order.
    pub entries: Vec<EntryId>,
    /// Reversal entries written while compensating.
    pub compensations: Vec<EntryId>,
    pub failure: Option<String>,
    /// Applied legs that could not be reversed. Needs operator attention.
    pub uncompensated: Vec<EntryId>,
}

impl SettlementReport {
    pub(crate) fn new(
        session: SessionId,
        currency: CurrencyCode,
        participants: Vec<AccountId>,
        entry_fee: i64,
    ) -> Self {
        Self {
            session,
            state: SettlementState::Pending,
            currency,
            participants,
            entry_fee,
            collected: 0,
            pool: 0,
            commission: 0,
            credits: Vec::new(),
            entries: Vec::new(),
            compensations: Vec::new(),
            failure: None,
            uncompensated: Vec::new(),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state == SettlementState::Settled
    }

    /// Total paid out to ranked accounts.
    pub fn credited(&self) -> i64 {
        self.credits.iter().map(|c| c.amount).sum()
    }

    pub fn credit_for(&self, account: &AccountId) -> i64 {
        self.credits
            .iter()
            .filter(|c| &c.account == account)
            .map(|c| c.amount)
            .sum()
    }
}

/// Game-session lifecycle events delivered by the session collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session: SessionId,
        participants: Vec<AccountId>,
        entry_fee: i64,
        currency: CurrencyCode,
    },
    Completed {
        session: SessionId,
        /// Best first.
        final_ranking: Vec<AccountId>,
        /// Equal scores between neighbours in the ranking mark a tie.
        #[serde(default)]
        scores: BTreeMap<AccountId, i64>,
    },
    Abandoned {
        session: SessionId,
    },
}

impl SessionEvent {
    pub fn session(&self) -> &SessionId {
        match self {
            Self::Started { session, .. }
            | Self::Completed { session, .. }
            | Self::Abandoned { session } => session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(SettlementState::Settled.is_terminal());
        assert!(SettlementState::Failed.is_terminal());
        assert!(!SettlementState::Collecting.is_terminal());
        assert!(!SettlementState::Distributing.is_terminal());
    }

    #[test]
    fn completed_event_parses_with_default_scores() {
        let event: SessionEvent = toml::from_str(
            r#"
            event = "completed"
            session = "s-9"
            final_ranking = ["bob", "alice"]
            "#,
        )
        .unwrap();
        assert_eq!(event.session(), &SessionId::new("s-9"));
        match event {
            SessionEvent::Completed {
                final_ranking,
                scores,
                ..
            } => {
                assert_eq!(final_ranking, vec![AccountId::new("bob"), AccountId::new("alice")]);
                assert!(scores.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn credit_lookup_sums_per_account() {
        let mut report = SettlementReport::new(
            SessionId::new("s"),
            CurrencyCode::parse("COIN").unwrap(),
            vec![],
            10,
        );
        report.credits.push(Credit {
            account: AccountId::new("a"),
            amount: 7,
        });
        report.credits.push(Credit {
            account: AccountId::new("b"),
            amount: 3,
        });
        assert_eq!(report.credit_for(&AccountId::new("a")), 7);
        assert_eq!(report.credited(), 10);
    }
}
