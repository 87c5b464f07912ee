use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const MAX_CODE_LEN: usize = 16;

/// Unique short code of a virtual currency (e.g. `COIN`, `GEM`).
///
/// Codes are 1–16 characters of ASCII uppercase letters, digits, or `_`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse and validate a currency code.
    pub fn parse(code: &str) -> Result<Self, TypeError> {
        if code.is_empty() {
            return Err(TypeError::InvalidCurrencyCode {
                code: code.to_string(),
                reason: "code is empty",
            });
        }
        if code.len() > MAX_CODE_LEN {
            return Err(TypeError::InvalidCurrencyCode {
                code: code.to_string(),
                reason: "code is longer than 16 characters",
            });
        }
        if !code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(TypeError::InvalidCurrencyCode {
                code: code.to_string(),
                reason: "code must be uppercase ASCII letters, digits, or '_'",
            });
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Debug for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyCode({})", self.0)
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration of a virtual currency.
///
/// A currency is configured once. Only the `active` flag may change after
/// registration; caps of `0` mean unlimited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyType {
    pub code: CurrencyCode,
    /// Purchasable with real money.
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub tradeable: bool,
    /// Maximum amount an account may earn per UTC day (0 = unlimited).
    #[serde(default)]
    pub daily_earn_cap: i64,
    /// Maximum balance an account may hold (0 = unlimited).
    #[serde(default)]
    pub total_hold_cap: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Whether balances may drop below zero. Play currencies never do.
    #[serde(default)]
    pub allow_negative: bool,
}

fn default_active() -> bool {
    true
}

impl CurrencyType {
    /// An active, uncapped, non-premium play currency.
    pub fn new(code: CurrencyCode) -> Self {
        Self {
            code,
            premium: false,
            tradeable: false,
            daily_earn_cap: 0,
            total_hold_cap: 0,
            active: true,
            allow_negative: false,
        }
    }

    pub fn with_daily_earn_cap(mut self, cap: i64) -> Self {
        self.daily_earn_cap = cap;
        self
    }

    pub fn with_total_hold_cap(mut self, cap: i64) -> Self {
        self.total_hold_cap = cap;
        self
    }

    pub fn premium(mut self) -> Self {
        self.premium = true;
        self
    }

    pub fn tradeable(mut self) -> Self {
        self.tradeable = true;
        self
    }

    pub fn allowing_negative(mut self) -> Self {
        self.allow_negative = true;
        self
    }

    /// Returns `true` if a daily earn cap is configured.
    pub fn has_daily_cap(&self) -> bool {
        self.daily_earn_cap > 0
    }

    /// Returns `true` if a total hold cap is configured.
    pub fn has_hold_cap(&self) -> bool {
        self.total_hold_cap > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_accepts_common_codes() {
        for code in ["COIN", "GEM", "XP_2", "T"] {
            assert_eq!(CurrencyCode::parse(code).unwrap().as_str(), code);
        }
    }

    #[test]
    fn parse_rejects_bad_codes() {
        assert!(CurrencyCode::parse("").is_err());
        assert!(CurrencyCode::parse("coin").is_err());
        assert!(CurrencyCode::parse("CO IN").is_err());
        assert!(CurrencyCode::parse("ABCDEFGHIJKLMNOPQ").is_err());
    }

    #[test]
    fn deserialize_validates_code() {
        let bad: Result<CurrencyCode, _> = serde_json::from_str("\"gem\"");
        assert!(bad.is_err());
        let good: CurrencyCode = serde_json::from_str("\"GEM\"").unwrap();
        assert_eq!(good.as_str(), "GEM");
    }

    #[test]
    fn currency_defaults_from_json() {
        let currency: CurrencyType = serde_json::from_str(r#"{"code":"COIN"}"#).unwrap();
        assert!(currency.active);
        assert!(!currency.premium);
        assert!(!currency.has_daily_cap());
        assert!(!currency.has_hold_cap());
        assert!(!currency.allow_negative);
    }

    #[test]
    fn builder_sets_caps() {
        let gem = CurrencyType::new(CurrencyCode::parse("GEM").unwrap())
            .premium()
            .with_daily_earn_cap(50)
            .with_total_hold_cap(1_000);
        assert!(gem.premium);
        assert_eq!(gem.daily_earn_cap, 50);
        assert!(gem.has_hold_cap());
    }

    proptest! {
        #[test]
        fn valid_codes_always_parse(code in "[A-Z0-9_]{1,16}") {
            prop_assert!(CurrencyCode::parse(&code).is_ok());
        }

        #[test]
        fn lowercase_codes_never_parse(code in "[a-z]{1,16}") {
            prop_assert!(CurrencyCode::parse(&code).is_err());
        }
    }
}
