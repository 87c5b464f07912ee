use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_crypto::{IntegrityGuard, IntegrityKey};

use crate::error::LedgerError;

/// Configuration for the ledger store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Node identifier stamped into entry timestamps.
    pub node_id: u16,
    /// Bounded wait for a per-balance lock, in milliseconds.
    pub lock_timeout_ms: u64,
    /// Internal retries of `ConcurrencyConflict` / `TimeoutExceeded` before
    /// the error reaches the caller.
    pub max_retries: u32,
    /// Hex-encoded 32-byte integrity key. A random key is generated when
    /// absent, so hashes only verify within one process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_key: Option<String>,
    /// Capacity of the committed-entry broadcast channel.
    pub broadcast_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            lock_timeout_ms: 250,
            max_retries: 3,
            integrity_key: None,
            broadcast_capacity: 1024,
        }
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Build the integrity guard from the configured key.
    pub fn integrity_guard(&self) -> Result<IntegrityGuard, LedgerError> {
        match &self.integrity_key {
            Some(hex) => IntegrityKey::from_hex(hex)
                .map(IntegrityGuard::new)
                .map_err(|e| LedgerError::InvalidConfig(format!("integrity_key: {e}"))),
            None => Ok(IntegrityGuard::ephemeral()),
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.broadcast_capacity == 0 {
            return Err(LedgerError::InvalidConfig(
                "broadcast_capacity must be positive".into(),
            ));
        }
        self.integrity_guard().map(|_| ())
    }
}
