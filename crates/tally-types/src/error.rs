use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid currency code {code:?}: {reason}")]
    InvalidCurrencyCode { code: String, reason: &'static str },

    #[error("identifier must not be empty")]
    EmptyIdentifier,

    #[error("invalid entry id: {0}")]
    InvalidEntryId(String),
}
