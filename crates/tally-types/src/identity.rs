use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque reference to a platform account.
///
/// Accounts are owned by the identity service; the ledger only stores the
/// identifier. The ordering is total so multi-account operations can sort
/// participants deterministically.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create an account id without validation. Use [`Self::parse`] for
    /// untrusted input.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse an account id, rejecting blank input.
    pub fn parse(id: &str) -> Result<Self, TypeError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(TypeError::EmptyIdentifier);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a game session, used as the settlement reference.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn parse(id: &str) -> Result<Self, TypeError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(TypeError::EmptyIdentifier);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
