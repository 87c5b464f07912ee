use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::SessionId;

/// Unique identifier for a ledger entry (UUID v7 for time-ordering).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(uuid::Uuid);

impl EntryId {
    /// Generate a new time-ordered entry ID (UUID v7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for EntryId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidEntryId(e.to_string()))
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.short_id())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Economic classification of a ledger entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Currency bought through a payment provider.
    Purchase,
    /// Reward claim (daily bonus, achievement, leaderboard payout).
    Reward,
    /// One leg of a player-to-player transfer.
    Transfer,
    /// Entry fee, reward, or commission of a game session.
    GameSettlement,
    /// Manual correction by operations.
    SystemAdjustment,
    /// Compensating entry negating a prior entry.
    Reversal,
}

impl EntryKind {
    /// Whether entries of this kind may be reversed. Reversals themselves are
    /// final so compensation chains stop at depth one.
    pub fn is_reversible(&self) -> bool {
        !matches!(self, Self::Reversal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Reward => "reward",
            Self::Transfer => "transfer",
            Self::GameSettlement => "game_settlement",
            Self::SystemAdjustment => "system_adjustment",
            Self::Reversal => "reversal",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ledger entry.
///
/// `Pending -> Completed | Failed`, and `Completed -> Reversed` once a
/// compensating entry has been appended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

impl EntryStatus {
    /// Returns `true` if the entry changed the balance it belongs to.
    ///
    /// A reversed entry was applied and later compensated by a separate
    /// reversal entry, so both still take part in replay.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Completed | Self::Reversed)
    }

    /// Returns `true` once the entry can no longer change status on its own.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Reversed => write!(f, "reversed"),
        }
    }
}

/// Kind of external object an entry refers to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    GameSession,
    Purchase,
    RewardClaim,
    Transfer,
    Adjustment,
    Custom(String),
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GameSession => write!(f, "game_session"),
            Self::Purchase => write!(f, "purchase"),
            Self::RewardClaim => write!(f, "reward_claim"),
            Self::Transfer => write!(f, "transfer"),
            Self::Adjustment => write!(f, "adjustment"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// External reference attached to an entry (type + external id).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub external_id: String,
}

impl Reference {
    pub fn new(kind: ReferenceKind, external_id: impl Into<String>) -> Self {
        Self {
            kind,
            external_id: external_id.into(),
        }
    }

    /// Reference to a game session; all legs of a settlement share it.
    pub fn session(session: &SessionId) -> Self {
        Self::new(ReferenceKind::GameSession, session.as_str())
    }

    pub fn purchase(order_id: impl Into<String>) -> Self {
        Self::new(ReferenceKind::Purchase, order_id)
    }

    pub fn reward_claim(claim_id: impl Into<String>) -> Self {
        Self::new(ReferenceKind::RewardClaim, claim_id)
    }

    pub fn adjustment(ticket: impl Into<String>) -> Self {
        Self::new(ReferenceKind::Adjustment, ticket)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.external_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_ids_are_unique() {
        let first = EntryId::new();
        let second = EntryId::new();
        assert_ne!(first, second);
        assert_eq!(first.short_id().len(), 8);
    }

    #[test]
    fn entry_id_parse_roundtrip() {
        let id = EntryId::new();
        let parsed: EntryId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<EntryId>().is_err());
    }

    #[test]
    fn reversal_kind_is_final() {
        assert!(!EntryKind::Reversal.is_reversible());
        assert!(EntryKind::GameSettlement.is_reversible());
        assert!(EntryKind::Purchase.is_reversible());
    }

    #[test]
    fn applied_statuses() {
        assert!(EntryStatus::Completed.is_applied());
        assert!(EntryStatus::Reversed.is_applied());
        assert!(!EntryStatus::Failed.is_applied());
        assert!(!EntryStatus::Pending.is_applied());
        assert!(!EntryStatus::Pending.is_final());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&EntryKind::GameSettlement).unwrap();
        assert_eq!(json, "\"game_settlement\"");
        assert_eq!(EntryKind::SystemAdjustment.to_string(), "system_adjustment");
    }

    #[test]
    fn reference_display() {
        let session = SessionId::new("match-42");
        assert_eq!(Reference::session(&session).to_string(), "game_session/match-42");
        let custom = Reference::new(ReferenceKind::Custom("promo".into()), "spring");
        assert_eq!(custom.to_string(), "custom:promo/spring");
    }
}
