use tally_gate::DenyReason;
use tally_types::{AccountId, CurrencyCode, EntryId};

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient funds for {account}/{currency}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        currency: CurrencyCode,
        balance: i64,
        requested: i64,
    },

    #[error("limit exceeded for {account}/{currency}: {reason}")]
    LimitExceeded {
        account: AccountId,
        currency: CurrencyCode,
        reason: DenyReason,
    },

    #[error("entry {entry} is not reversible: {reason}")]
    NotReversible { entry: EntryId, reason: String },

    #[error("integrity violation on {account}/{currency}: {detail}")]
    IntegrityViolation {
        account: AccountId,
        currency: CurrencyCode,
        detail: String,
    },

    #[error("concurrent modification of {account}/{currency}: expected balance {expected}, found {actual}")]
    ConcurrencyConflict {
        account: AccountId,
        currency: CurrencyCode,
        expected: i64,
        actual: i64,
    },

    #[error("timed out after {waited_ms}ms waiting for {account}/{currency}")]
    TimeoutExceeded {
        account: AccountId,
        currency: CurrencyCode,
        waited_ms: u64,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid entry draft: {0}")]
    InvalidDraft(String),

    #[error("unknown currency: {0}")]
    UnknownCurrency(CurrencyCode),

    #[error("currency is inactive: {0}")]
    CurrencyInactive(CurrencyCode),

    #[error("currency already registered: {0}")]
    DuplicateCurrency(CurrencyCode),

    #[error("entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("account {0} is frozen pending integrity review")]
    AccountFrozen(AccountId),

    #[error("projection diverged for {account}/{currency}: {detail}")]
    ProjectionDivergence {
        account: AccountId,
        currency: CurrencyCode,
        detail: String,
    },

    #[error("limit check failed: {0}")]
    LimitCheck(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("restore failed: {0}")]
    Restore(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger {0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("io error: {0}")]
    Io(String),
}

impl LedgerError {
    /// Returns `true` for transient failures the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::TimeoutExceeded { .. }
        )
    }

    /// Returns `true` for rejections that are recorded as `failed` entries.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. } | Self::LimitExceeded { .. }
        )
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
