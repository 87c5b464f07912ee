//! Integrity primitives for the Tally economy ledger.
//!
//! Provides keyed, domain-separated BLAKE3 hashing of ledger entries and
//! balance snapshots. Any row modified outside the ledger API no longer
//! matches its stored hash.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod integrity;

pub use integrity::{
    BalanceMaterial, EntryMaterial, IntegrityError, IntegrityGuard, IntegrityHash, IntegrityKey,
};
