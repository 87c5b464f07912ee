use tally_ledger::LedgerError;

/// Errors produced while evaluating fraud heuristics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FraudError {
    #[error("game activity source failed: {0}")]
    Activity(String),

    #[error("fraud monitor task failed: {0}")]
    Monitor(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
