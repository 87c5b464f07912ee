use std::fmt;

use serde::{Deserialize, Serialize};
use tally_types::{AccountId, CurrencyCode, Timestamp};

const ENTRY_DOMAIN: &str = "tally-entry-v1";
const BALANCE_DOMAIN: &str = "tally-balance-v1";

/// Process-wide secret key for integrity hashing.
#[derive(Clone, PartialEq, Eq)]
pub struct IntegrityKey([u8; 32]);

impl IntegrityKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(s: &str) -> Result<Self, IntegrityError> {
        let bytes = hex::decode(s.trim()).map_err(|e| IntegrityError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| IntegrityError::InvalidLength {
                expected: 32,
                actual: b.len(),
            })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for IntegrityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrityKey(<redacted>)")
    }
}

/// Keyed BLAKE3 digest stored alongside an entry or balance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IntegrityHash([u8; 32]);

impl IntegrityHash {
    /// Placeholder used before a record has been signed.
    pub const UNSIGNED: Self = Self([0; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn is_unsigned(&self) -> bool {
        *self == Self::UNSIGNED
    }
}

impl TryFrom<String> for IntegrityHash {
    type Error = IntegrityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(&value).map_err(|e| IntegrityError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| IntegrityError::InvalidLength {
                expected: 32,
                actual: b.len(),
            })?;
        Ok(Self(arr))
    }
}

impl From<IntegrityHash> for String {
    fn from(hash: IntegrityHash) -> Self {
        hash.to_hex()
    }
}

impl fmt::Debug for IntegrityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrityHash({})", self.short_hex())
    }
}

impl fmt::Display for IntegrityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The entry fields covered by the integrity hash.
#[derive(Clone, Copy, Debug)]
pub struct EntryMaterial<'a> {
    pub account: &'a AccountId,
    pub currency: &'a CurrencyCode,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub created: Timestamp,
    /// Creation time of the entry a reversal compensates.
    pub parent_created: Option<Timestamp>,
}

/// The balance snapshot fields covered by the integrity hash.
#[derive(Clone, Copy, Debug)]
pub struct BalanceMaterial<'a> {
    pub account: &'a AccountId,
    pub currency: &'a CurrencyCode,
    pub current: i64,
    pub lifetime_earned: i64,
    pub lifetime_spent: i64,
    pub daily_earned: i64,
    /// Days since the common era of the last daily reset, if any.
    pub last_reset_day: Option<i32>,
    pub last_modified: Timestamp,
}

/// Signs and verifies ledger rows with a keyed, domain-separated hash.
///
/// Every field is written with a fixed-width or length-prefixed encoding so
/// two different rows can never produce the same byte stream.
pub struct IntegrityGuard {
    key: IntegrityKey,
}

impl IntegrityGuard {
    pub fn new(key: IntegrityKey) -> Self {
        Self { key }
    }

    /// Guard with a freshly generated key. Hashes do not survive a restart.
    pub fn ephemeral() -> Self {
        Self::new(IntegrityKey::generate())
    }

    pub fn sign_entry(&self, material: &EntryMaterial<'_>) -> IntegrityHash {
        let mut hasher = self.hasher(ENTRY_DOMAIN);
        write_str(&mut hasher, material.account.as_str());
        write_str(&mut hasher, material.currency.as_str());
        hasher.update(&material.amount.to_le_bytes());
        hasher.update(&material.balance_before.to_le_bytes());
        hasher.update(&material.balance_after.to_le_bytes());
        write_timestamp(&mut hasher, &material.created);
        match &material.parent_created {
            Some(ts) => {
                hasher.update(&[1]);
                write_timestamp(&mut hasher, ts);
            }
            None => {
                hasher.update(&[0]);
            }
        }
        IntegrityHash(*hasher.finalize().as_bytes())
    }

    pub fn verify_entry(&self, material: &EntryMaterial<'_>, expected: &IntegrityHash) -> bool {
        self.sign_entry(material) == *expected
    }

    pub fn sign_balance(&self, material: &BalanceMaterial<'_>) -> IntegrityHash {
        let mut hasher = self.hasher(BALANCE_DOMAIN);
        write_str(&mut hasher, material.account.as_str());
        write_str(&mut hasher, material.currency.as_str());
        hasher.update(&material.current.to_le_bytes());
        hasher.update(&material.lifetime_earned.to_le_bytes());
        hasher.update(&material.lifetime_spent.to_le_bytes());
        hasher.update(&material.daily_earned.to_le_bytes());
        match material.last_reset_day {
            Some(day) => {
                hasher.update(&[1]);
                hasher.update(&day.to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        write_timestamp(&mut hasher, &material.last_modified);
        IntegrityHash(*hasher.finalize().as_bytes())
    }

    pub fn verify_balance(&self, material: &BalanceMaterial<'_>, expected: &IntegrityHash) -> bool {
        self.sign_balance(material) == *expected
    }

    fn hasher(&self, domain: &str) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new_keyed(&self.key.0);
        hasher.update(domain.as_bytes());
        hasher.update(b":");
        hasher
    }
}

impl fmt::Debug for IntegrityGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityGuard").field("key", &self.key).finish()
    }
}

fn write_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn write_timestamp(hasher: &mut blake3::Hasher, ts: &Timestamp) {
    hasher.update(&ts.physical_ms.to_le_bytes());
    hasher.update(&ts.logical.to_le_bytes());
    hasher.update(&ts.node_id.to_le_bytes());
}

/// Errors from integrity key and hash handling.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountId {
        AccountId::new("alice")
    }

    fn coin() -> CurrencyCode {
        CurrencyCode::parse("COIN").unwrap()
    }

    fn entry<'a>(account: &'a AccountId, currency: &'a CurrencyCode, amount: i64) -> EntryMaterial<'a> {
        EntryMaterial {
            account,
            currency,
            amount,
            balance_before: 100,
            balance_after: 100 + amount,
            created: Timestamp::new(1_700_000_000_000, 0, 0),
            parent_created: None,
        }
    }

    #[test]
    fn sign_is_deterministic() {
        let guard = IntegrityGuard::new(IntegrityKey::from_bytes([7; 32]));
        let (a, c) = (account(), coin());
        assert_eq!(guard.sign_entry(&entry(&a, &c, 5)), guard.sign_entry(&entry(&a, &c, 5)));
    }

    #[test]
    fn tampered_amount_fails_verify() {
        let guard = IntegrityGuard::ephemeral();
        let (a, c) = (account(), coin());
        let hash = guard.sign_entry(&entry(&a, &c, 5));
        assert!(guard.verify_entry(&entry(&a, &c, 5), &hash));
        assert!(!guard.verify_entry(&entry(&a, &c, 500), &hash));
    }

    #[test]
    fn different_keys_produce_different_hashes() {
        let g1 = IntegrityGuard::new(IntegrityKey::from_bytes([1; 32]));
        let g2 = IntegrityGuard::new(IntegrityKey::from_bytes([2; 32]));
        let (a, c) = (account(), coin());
        assert_ne!(g1.sign_entry(&entry(&a, &c, 1)), g2.sign_entry(&entry(&a, &c, 1)));
    }

    #[test]
    fn length_prefix_prevents_field_shifting() {
        let guard = IntegrityGuard::ephemeral();
        let (a1, c1) = (AccountId::new("ab"), CurrencyCode::parse("C").unwrap());
        let (a2, c2) = (AccountId::new("a"), CurrencyCode::parse("BC").unwrap());
        assert_ne!(
            guard.sign_entry(&entry(&a1, &c1, 1)),
            guard.sign_entry(&entry(&a2, &c2, 1))
        );
    }

    #[test]
    fn entry_hash_covers_parent_time() {
        let guard = IntegrityGuard::ephemeral();
        let (a, c) = (account(), coin());
        let reversal = EntryMaterial {
            parent_created: Some(Timestamp::new(1_699_900_000_000, 0, 0)),
            ..entry(&a, &c, -5)
        };
        let hash = guard.sign_entry(&reversal);
        assert!(guard.verify_entry(&reversal, &hash));

        let moved = EntryMaterial {
            parent_created: Some(Timestamp::new(1_700_000_000_000, 0, 0)),
            ..reversal
        };
        assert!(!guard.verify_entry(&moved, &hash));
        assert!(!guard.verify_entry(&entry(&a, &c, -5), &hash));
    }

    #[test]
    fn balance_hash_covers_reset_day() {
        let guard = IntegrityGuard::ephemeral();
        let (a, c) = (account(), coin());
        let base = BalanceMaterial {
            account: &a,
            currency: &c,
            current: 10,
            lifetime_earned: 10,
            lifetime_spent: 0,
            daily_earned: 10,
            last_reset_day: Some(739_000),
            last_modified: Timestamp::zero(),
        };
        let hash = guard.sign_balance(&base);
        assert!(guard.verify_balance(&base, &hash));

        let shifted = BalanceMaterial {
            last_reset_day: None,
            ..base
        };
        assert!(!guard.verify_balance(&shifted, &hash));
    }

    #[test]
    fn key_from_hex_validates_length() {
        let key = IntegrityKey::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(key, IntegrityKey::from_bytes([0xab; 32]));
        assert_eq!(
            IntegrityKey::from_hex("abcd").unwrap_err(),
            IntegrityError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
        assert!(matches!(
            IntegrityKey::from_hex("zz"),
            Err(IntegrityError::InvalidHex(_))
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let debug = format!("{:?}", IntegrityGuard::ephemeral());
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn hash_serde_roundtrip() {
        let hash = IntegrityHash::from_bytes([0x5a; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "5a".repeat(32)));
        let parsed: IntegrityHash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hash);
        assert!(IntegrityHash::UNSIGNED.is_unsigned());
    }
}
