use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::LedgerError;
use crate::records::BalanceKey;

/// Table of per-balance exclusive locks.
///
/// Holding the guard for a key serializes every mutation of that balance.
/// Waiting is bounded: a caller that cannot acquire the key within the
/// timeout gets `TimeoutExceeded`.
#[derive(Debug, Default)]
pub struct KeyLocks {
    held: Mutex<HashSet<BalanceKey>>,
    released: Condvar,
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: BalanceKey,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, key: &BalanceKey, timeout: Duration) -> Result<KeyGuard<'_>, LedgerError> {
        let start = Instant::now();
        let mut held = self
            .held
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("key table"))?;

        while held.contains(key) {
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(LedgerError::TimeoutExceeded {
                    account: key.account.clone(),
                    currency: key.currency.clone(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            let (next, _) = self
                .released
                .wait_timeout(held, timeout - waited)
                .map_err(|_| LedgerError::LockPoisoned("key table"))?;
            held = next;
        }

        held.insert(key.clone());
        Ok(KeyGuard {
            locks: self,
            key: key.clone(),
        })
    }

    pub fn is_held(&self, key: &BalanceKey) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(key))
            .unwrap_or(false)
    }
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &BalanceKey {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.key);
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use tally_types::{AccountId, CurrencyCode};

    use super::*;

    fn key(account: &str) -> BalanceKey {
        BalanceKey::new(AccountId::new(account), CurrencyCode::parse("COIN").unwrap())
    }

    #[test]
    fn guard_releases_on_drop() {
        let locks = KeyLocks::new();
        {
            let guard = locks.acquire(&key("a"), Duration::from_millis(10)).unwrap();
            assert_eq!(guard.key(), &key("a"));
            assert!(locks.is_held(&key("a")));
        }
        assert!(!locks.is_held(&key("a")));
    }

    #[test]
    fn distinct_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.acquire(&key("a"), Duration::from_millis(10)).unwrap();
        let _b = locks.acquire(&key("b"), Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn contended_key_times_out() {
        let locks = KeyLocks::new();
        let _held = locks.acquire(&key("a"), Duration::from_millis(10)).unwrap();
        let err = locks.acquire(&key("a"), Duration::from_millis(20)).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, LedgerError::TimeoutExceeded { .. }));
    }

    #[test]
    fn waiter_wakes_when_released() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.acquire(&key("a"), Duration::from_millis(10)).unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || locks.acquire(&key("a"), Duration::from_secs(5)).map(|_| ()))
        };
        thread::sleep(Duration::from_millis(20));
        drop(guard);

        waiter.join().unwrap().unwrap();
    }
}
