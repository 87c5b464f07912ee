//! Foundation types for the Tally economy ledger.
//!
//! This crate provides the identity, currency, and temporal types shared by
//! every other Tally crate.
//!
//! # Key Types
//!
//! - [`AccountId`] - Opaque, totally ordered account reference
//! - [`CurrencyCode`] / [`CurrencyType`] - Virtual currency identity and caps
//! - [`EntryId`] - UUID v7 ledger entry identifier
//! - [`EntryKind`] / [`EntryStatus`] - Entry classification and lifecycle
//! - [`Reference`] - External reference (session, purchase, claim)
//! - [`Timestamp`] - Monotonic wall-clock anchor with a logical counter
//! - [`Clock`] - Injectable time source

pub mod currency;
pub mod entry;
pub mod error;
pub mod identity;
pub mod temporal;

pub use currency::{CurrencyCode, CurrencyType};
pub use entry::{EntryId, EntryKind, EntryStatus, Reference, ReferenceKind};
pub use error::TypeError;
pub use identity::{AccountId, SessionId};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
