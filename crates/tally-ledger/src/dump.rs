use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tally_types::CurrencyType;

use crate::error::LedgerError;
use crate::records::LedgerEntry;

/// Portable ledger state: the currency list and the full entry log.
///
/// Balances are not stored; they are rebuilt by replay on restore.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDump {
    pub format: u32,
    pub currencies: Vec<CurrencyType>,
    /// Entries in commit order.
    pub entries: Vec<LedgerEntry>,
}

impl LedgerDump {
    pub const FORMAT: u32 = 1;

    pub fn new(currencies: Vec<CurrencyType>, entries: Vec<LedgerEntry>) -> Self {
        Self {
            format: Self::FORMAT,
            currencies,
            entries,
        }
    }

    pub fn to_json(&self) -> Result<String, LedgerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let dump: Self = serde_json::from_str(json)?;
        if dump.format != Self::FORMAT {
            return Err(LedgerError::Restore(format!(
                "unsupported dump format {}",
                dump.format
            )));
        }
        Ok(dump)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), LedgerError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, LedgerError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}
