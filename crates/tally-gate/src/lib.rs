//! Limit enforcement for the Tally economy ledger.
//!
//! Every earning write is checked against the currency's daily earn cap and
//! total hold cap before it is committed. The gate runs a configurable
//! pipeline of stages and produces an allow/deny verdict with a per-stage
//! trail. Spending is never limited.
//!
//! # Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use tally_gate::{BalanceView, LimitConfig, LimitGate, LimitRequest};
//! use tally_types::{AccountId, CurrencyCode, CurrencyType, EntryKind};
//!
//! let gate = LimitGate::with_default_stages(LimitConfig::default());
//! let coin = CurrencyType::new(CurrencyCode::parse("COIN").unwrap()).with_daily_earn_cap(100);
//! let alice = AccountId::new("alice");
//! let request = LimitRequest {
//!     account: &alice,
//!     currency: &coin,
//!     amount: 60,
//!     kind: EntryKind::Reward,
//!     balance: BalanceView::default(),
//!     today: NaiveDate::from_ymd_opt(2026, 5, 3).unwrap(),
//! };
//! assert!(gate.check(&request).unwrap().is_allowed());
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod stage;
pub mod stages;

pub use config::LimitConfig;
pub use error::GateError;
pub use gate::{LimitDecision, LimitGate, LimitVerdict};
pub use stage::{BalanceView, DenyReason, LimitRequest, LimitStage, StageDecision, StageResult};
pub use stages::{DailyEarnStage, HoldCapStage};
