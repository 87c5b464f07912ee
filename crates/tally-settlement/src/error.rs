use tally_ledger::LedgerError;
use tally_types::SessionId;

use crate::session::SettlementState;

/// Errors produced by the settlement coordinator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("session {session} is {state}, cannot {operation}")]
    InvalidState {
        session: SessionId,
        state: SettlementState,
        operation: &'static str,
    },

    #[error("session {session} is busy with another operation")]
    Busy { session: SessionId },

    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("session {0} was already settled")]
    AlreadySettled(SessionId),

    #[error("payout does not balance: credits {credits} + commission {commission} != pool {pool}")]
    Unbalanced {
        pool: i64,
        credits: i64,
        commission: i64,
    },

    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("session table lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SettlementError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Busy { .. } => true,
            Self::Ledger(err) => err.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use tally_types::AccountId;

    use super::*;

    #[test]
    fn ledger_errors_keep_retryability() {
        let frozen = SettlementError::from(LedgerError::AccountFrozen(AccountId::new("a")));
        assert!(!frozen.is_retryable());
        assert_eq!(frozen.to_string(), "account a is frozen pending integrity review");

        let busy = SettlementError::Busy {
            session: SessionId::new("s-1"),
        };
        assert!(busy.is_retryable());
    }

    #[test]
    fn invalid_state_display() {
        let err = SettlementError::InvalidState {
            session: SessionId::new("s-1"),
            state: SettlementState::Distributing,
            operation: "abandon",
        };
        assert_eq!(err.to_string(), "session s-1 is distributing, cannot abandon");
    }
}
