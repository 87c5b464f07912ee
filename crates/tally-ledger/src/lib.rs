//! Transactional currency ledger for the Tally game economy.
//!
//! This crate is the heart of Tally. It provides:
//! - `LedgerEntry` / `Balance` records with keyed integrity hashes
//! - `LedgerWriter` / `LedgerReader` trait boundaries
//! - `InMemoryLedger`: per-balance locking, limit checks, reversals,
//!   integrity holds, and a broadcast of committed entries
//! - Balance projection rebuild and verification
//! - Whole-ledger audits and JSON dumps
//!
//! # Quick Start
//!
//! ```rust
//! use tally_ledger::{EntryDraft, InMemoryLedger, LedgerReader, LedgerWriter};
//! use tally_types::{AccountId, CurrencyCode, CurrencyType, EntryKind, Reference};
//!
//! let ledger = InMemoryLedger::default();
//! let coin = CurrencyCode::parse("COIN").unwrap();
//! ledger.register_currency(CurrencyType::new(coin.clone())).unwrap();
//!
//! let alice = AccountId::new("alice");
//! let draft = EntryDraft::new(alice.clone(), coin.clone(), 500, EntryKind::Purchase, Reference::purchase("order-1"));
//! let entry = ledger.append(&draft).unwrap();
//! assert_eq!(entry.balance_after, 500);
//! assert_eq!(ledger.balance(&alice, &coin).unwrap().unwrap().current, 500);
//! ```

pub mod audit;
pub mod config;
pub mod currency;
pub mod dump;
pub mod error;
pub mod locks;
pub mod memory;
pub mod projection;
pub mod records;
pub mod reversal;
pub mod traits;
pub mod validation;

pub use audit::{AuditEvent, AuditRecord, AuditSink, MemoryAuditLog, TracingAuditSink};
pub use config::LedgerConfig;
pub use currency::CurrencyRegistry;
pub use dump::LedgerDump;
pub use error::LedgerError;
pub use locks::{KeyGuard, KeyLocks};
pub use memory::InMemoryLedger;
pub use projection::BalanceProjection;
pub use records::{Balance, BalanceKey, EntryDraft, LedgerEntry};
pub use reversal::ReversalPolicy;
pub use traits::{LedgerReader, LedgerWriter};
pub use validation::{LedgerAuditor, ValidationReport, Violation, ViolationKind};
