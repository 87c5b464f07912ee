//! `tally.toml`: one file configuring every component.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tally_fraud::FraudConfig;
use tally_gate::{LimitConfig, LimitGate};
use tally_ledger::{AuditSink, InMemoryLedger, LedgerConfig};
use tally_settlement::SettlementConfig;
use tally_types::{CurrencyCode, CurrencyType};

pub const DEFAULT_CONFIG_FILE: &str = "tally.toml";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub ledger: LedgerConfig,
    pub limits: LimitConfig,
    pub settlement: SettlementConfig,
    pub fraud: FraudConfig,
    pub currencies: Vec<CurrencyType>,
}

impl TallyConfig {
    /// Load `path`, or `./tally.toml` when it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path: Option<PathBuf> = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_toml(&text).with_context(|| format!("loading {}", path.display()))?
            }
            None => Self::default().effective()?,
        };
        Ok(config)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.effective()
    }

    /// Fill in built-in currencies, exempt the house account from caps, and
    /// validate every section.
    pub fn effective(mut self) -> anyhow::Result<Self> {
        if self.currencies.is_empty() {
            self.currencies = vec![
                CurrencyType::new(CurrencyCode::parse("COIN")?)
                    .with_daily_earn_cap(10_000)
                    .with_total_hold_cap(1_000_000),
                CurrencyType::new(CurrencyCode::parse("GEM")?).premium().tradeable(),
            ];
        }
        let house = &self.settlement.house_account;
        if !self.limits.exempt_accounts.contains(house) {
            self.limits.exempt_accounts.push(house.clone());
        }

        self.ledger.validate()?;
        self.settlement.validate()?;
        self.fraud.validate()?;
        for (i, currency) in self.currencies.iter().enumerate() {
            if self.currencies[..i].iter().any(|c| c.code == currency.code) {
                anyhow::bail!("currency {} declared twice", currency.code);
            }
        }
        Ok(self)
    }

    /// An empty ledger wired with this configuration's key and limits.
    /// Currencies are not registered.
    pub fn build_ledger(&self, audit: Arc<dyn AuditSink>) -> anyhow::Result<InMemoryLedger> {
        Ok(InMemoryLedger::from_config(self.ledger.clone())?
            .with_limit_gate(LimitGate::with_default_stages(self.limits.clone()))
            .with_audit_sink(audit))
    }

    pub fn currency(&self, code: &CurrencyCode) -> Option<&CurrencyType> {
        self.currencies.iter().find(|c| &c.code == code)
    }
}

#[cfg(test)]
mod tests {
    use tally_settlement::RemainderPolicy;
    use tally_types::AccountId;

    use super::*;

    const SAMPLE: &str = r#"
        [ledger]
        lock_timeout_ms = 100
        integrity_key = "0202020202020202020202020202020202020202020202020202020202020202"

        [settlement]
        commission_bps = 500
        payout_table_bps = [10000]
        house_account = "platform"
        remainder_policy = "top_ranked"

        [fraud]
        rapid_purchases = 3

        [[currencies]]
        code = "STAR"
        daily_earn_cap = 250
    "#;

    #[test]
    fn defaults_are_effective() {
        let config = TallyConfig::default().effective().unwrap();
        assert_eq!(config.currencies.len(), 2);
        assert_eq!(config.currencies[0].daily_earn_cap, 10_000);
        assert!(config.limits.is_exempt(&AccountId::new("house"), tally_types::EntryKind::Reward));
    }

    #[test]
    fn sample_file_parses() {
        let config = TallyConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.ledger.lock_timeout_ms, 100);
        assert_eq!(config.settlement.remainder_policy, RemainderPolicy::TopRanked);
        assert_eq!(config.fraud.rapid_purchases, 3);
        assert_eq!(config.currencies.len(), 1);
        let star = config.currency(&CurrencyCode::parse("STAR").unwrap()).unwrap();
        assert_eq!(star.daily_earn_cap, 250);
        assert!(star.active);
        assert_eq!(config.limits.exempt_accounts, vec![AccountId::new("platform")]);
    }

    #[test]
    fn invalid_section_is_rejected() {
        let err = TallyConfig::from_toml("[settlement]\npayout_table_bps = [100]\n").unwrap_err();
        assert!(err.to_string().contains("payout_table_bps"), "{err}");
    }

    #[test]
    fn duplicate_currency_is_rejected() {
        let text = "[[currencies]]\ncode = \"COIN\"\n[[currencies]]\ncode = \"COIN\"\n";
        assert!(TallyConfig::from_toml(text).is_err());
    }

    #[test]
    fn printed_config_reloads() {
        let config = TallyConfig::from_toml(SAMPLE).unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(TallyConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.toml");
        fs::write(&path, SAMPLE).unwrap();
        let config = TallyConfig::load(Some(&path)).unwrap();
        assert_eq!(config.settlement.house_account, AccountId::new("platform"));
        assert!(TallyConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
