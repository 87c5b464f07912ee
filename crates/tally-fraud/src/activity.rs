//! Game-event source consulted by the fraud heuristics.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tally_types::{AccountId, SessionId};

use crate::error::FraudError;

/// A finished game session as reported by the session service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub session: SessionId,
    pub completed_at_ms: u64,
    pub duration_ms: u64,
}

/// Read access to game-session history outside the ledger.
pub trait GameActivity: Send + Sync {
    /// Sessions `account` completed at or after `since_ms`.
    fn completions_since(
        &self,
        account: &AccountId,
        since_ms: u64,
    ) -> Result<Vec<CompletedSession>, FraudError>;
}

/// Source with no game history. Disables the fast-completion flag.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoActivity;

impl GameActivity for NoActivity {
    fn completions_since(&self, _: &AccountId, _: u64) -> Result<Vec<CompletedSession>, FraudError> {
        Ok(Vec::new())
    }
}

/// In-process activity log.
#[derive(Debug, Default)]
pub struct MemoryActivity {
    sessions: RwLock<HashMap<AccountId, Vec<CompletedSession>>>,
}

impl MemoryActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, account: AccountId, session: CompletedSession) -> Result<(), FraudError> {
        self.sessions
            .write()
            .map_err(|_| FraudError::Activity("activity lock poisoned".into()))?
            .entry(account)
            .or_default()
            .push(session);
        Ok(())
    }
}

impl GameActivity for MemoryActivity {
    fn completions_since(
        &self,
        account: &AccountId,
        since_ms: u64,
    ) -> Result<Vec<CompletedSession>, FraudError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| FraudError::Activity("activity lock poisoned".into()))?;
        Ok(sessions
            .get(account)
            .map(|all| {
                all.iter()
                    .filter(|s| s.completed_at_ms >= since_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
