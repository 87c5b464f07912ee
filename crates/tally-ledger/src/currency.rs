use std::collections::BTreeMap;

use tally_types::{CurrencyCode, CurrencyType};

use crate::error::LedgerError;

/// Registered currencies, keyed by code.
///
/// A currency's caps and flags are fixed at registration; only the `active`
/// flag may be toggled afterwards.
#[derive(Clone, Debug, Default)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<CurrencyCode, CurrencyType>,
}

impl CurrencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, currency: CurrencyType) -> Result<(), LedgerError> {
        if self.currencies.contains_key(&currency.code) {
            return Err(LedgerError::DuplicateCurrency(currency.code));
        }
        self.currencies.insert(currency.code.clone(), currency);
        Ok(())
    }

    pub fn set_active(&mut self, code: &CurrencyCode, active: bool) -> Result<(), LedgerError> {
        let currency = self
            .currencies
            .get_mut(code)
            .ok_or_else(|| LedgerError::UnknownCurrency(code.clone()))?;
        currency.active = active;
        Ok(())
    }

    pub fn get(&self, code: &CurrencyCode) -> Option<&CurrencyType> {
        self.currencies.get(code)
    }

    /// The currency, if it is registered and active.
    pub fn require_active(&self, code: &CurrencyCode) -> Result<&CurrencyType, LedgerError> {
        let currency = self
            .currencies
            .get(code)
            .ok_or_else(|| LedgerError::UnknownCurrency(code.clone()))?;
        if !currency.active {
            return Err(LedgerError::CurrencyInactive(code.clone()));
        }
        Ok(currency)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CurrencyType> {
        self.currencies.values()
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}
