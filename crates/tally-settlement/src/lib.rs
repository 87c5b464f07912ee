//! Game session settlement for the Tally economy.
//!
//! A session collects an entry fee from each participant, then pays the
//! reward pool out over the final ranking with a house commission. Each
//! leg is a ledger entry; a failed leg compensates all applied legs.
//!
//! # Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use tally_ledger::{EntryDraft, InMemoryLedger, LedgerWriter};
//! use tally_settlement::{SettlementConfig, SettlementCoordinator, SettlementState};
//! use tally_types::{AccountId, CurrencyCode, CurrencyType, EntryKind, Reference, SessionId};
//!
//! let ledger = Arc::new(InMemoryLedger::default());
//! let coin = CurrencyCode::parse("COIN").unwrap();
//! ledger.register_currency(CurrencyType::new(coin.clone())).unwrap();
//!
//! let players: Vec<AccountId> = ["ann", "ben"].into_iter().map(AccountId::new).collect();
//! for p in &players {
//!     let topup = EntryDraft::new(p.clone(), coin.clone(), 100, EntryKind::Purchase, Reference::purchase(p.as_str()));
//!     ledger.append(&topup).unwrap();
//! }
//!
//! let coordinator = SettlementCoordinator::new(ledger, SettlementConfig::winner_takes_all()).unwrap();
//! let session = SessionId::new("match-7");
//! coordinator.session_started(&session, &players, 50, &coin).unwrap();
//! let report = coordinator.session_completed(&session, &players, &BTreeMap::new()).unwrap();
//!
//! assert_eq!(report.state, SettlementState::Settled);
//! assert_eq!(report.credit_for(&players[0]), 90);
//! assert_eq!(report.commission, 10);
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod payout;
pub mod session;

pub use config::{RemainderPolicy, SettlementConfig, BPS_SCALE};
pub use coordinator::SettlementCoordinator;
pub use error::SettlementError;
pub use payout::Payout;
pub use session::{Credit, SessionEvent, SettlementReport, SettlementState};
