use serde::{Deserialize, Serialize};
use tally_types::{AccountId, EntryKind};

/// Configuration for the limit enforcement pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Accounts never subject to caps (e.g. the house account that receives
    /// commission).
    pub exempt_accounts: Vec<AccountId>,
    /// Entry kinds never subject to caps.
    pub exempt_kinds: Vec<EntryKind>,
    /// When `true`, every request is allowed without running stages.
    pub permissive: bool,
}

impl LimitConfig {
    /// A configuration that never denies. Useful for replaying imported
    /// history.
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Default::default()
        }
    }

    pub fn with_exempt_account(mut self, account: AccountId) -> Self {
        self.exempt_accounts.push(account);
        self
    }

    /// Returns `true` if the pipeline should be skipped for this request.
    pub fn is_exempt(&self, account: &AccountId, kind: EntryKind) -> bool {
        self.permissive
            || self.exempt_accounts.contains(account)
            || self.exempt_kinds.contains(&kind)
    }
}
