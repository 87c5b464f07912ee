use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;

use tally_crypto::{IntegrityGuard, IntegrityHash};
use tally_gate::{LimitDecision, LimitGate, LimitRequest};
use tally_types::{
    AccountId, Clock, CurrencyCode, CurrencyType, EntryId, EntryKind, EntryStatus, Reference,
    SystemClock, Timestamp,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditRecord, AuditSink, TracingAuditSink};
use crate::config::LedgerConfig;
use crate::currency::CurrencyRegistry;
use crate::dump::LedgerDump;
use crate::error::LedgerError;
use crate::locks::KeyLocks;
use crate::projection::BalanceProjection;
use crate::records::{Balance, BalanceKey, EntryDraft, LedgerEntry};
use crate::reversal::ReversalPolicy;
use crate::traits::{LedgerReader, LedgerWriter};

/// In-memory ledger store for services, tests, and local demos.
///
/// Entries live in an append-only arena indexed by id, by balance key, by
/// account, and by reference. Each (account, currency) is mutated under its
/// own key lock; the shared state lock is only taken for the short commit.
pub struct InMemoryLedger {
    config: LedgerConfig,
    guard: IntegrityGuard,
    gate: LimitGate,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    locks: KeyLocks,
    hlc: Mutex<Option<Timestamp>>,
    events: broadcast::Sender<LedgerEntry>,
    inner: RwLock<LedgerState>,
}

#[derive(Default)]
pub(crate) struct LedgerState {
    pub(crate) currencies: CurrencyRegistry,
    pub(crate) entries: Vec<LedgerEntry>,
    pub(crate) by_id: HashMap<EntryId, usize>,
    pub(crate) by_key: BTreeMap<BalanceKey, Vec<usize>>,
    pub(crate) by_account: HashMap<AccountId, Vec<usize>>,
    pub(crate) by_reference: HashMap<Reference, Vec<usize>>,
    pub(crate) balances: BTreeMap<BalanceKey, Balance>,
    pub(crate) frozen: HashSet<AccountId>,
}

impl LedgerState {
    fn push(&mut self, entry: LedgerEntry) {
        let index = self.entries.len();
        self.by_id.insert(entry.id, index);
        self.by_key.entry(entry.key()).or_default().push(index);
        self.by_account
            .entry(entry.account.clone())
            .or_default()
            .push(index);
        self.by_reference
            .entry(entry.reference.clone())
            .or_default()
            .push(index);
        self.entries.push(entry);
    }

    fn collect(&self, indexes: Option<&Vec<usize>>) -> Vec<LedgerEntry> {
        indexes
            .map(|ix| ix.iter().map(|&i| self.entries[i].clone()).collect())
            .unwrap_or_default()
    }
}

/// Outcome of pricing a draft against the current balance.
enum Screening {
    Accept,
    Reject(LedgerError),
}

impl InMemoryLedger {
    pub fn new(config: LedgerConfig, guard: IntegrityGuard) -> Self {
        let (events, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            config,
            guard,
            gate: LimitGate::default(),
            clock: Arc::new(SystemClock),
            audit: Arc::new(TracingAuditSink),
            locks: KeyLocks::new(),
            hlc: Mutex::new(None),
            events,
            inner: RwLock::new(LedgerState::default()),
        }
    }

    /// Build a ledger whose integrity key comes from the configuration.
    pub fn from_config(config: LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let guard = config.integrity_guard()?;
        Ok(Self::new(config, guard))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_limit_gate(mut self, gate: LimitGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn integrity_guard(&self) -> &IntegrityGuard {
        &self.guard
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        Arc::clone(&self.audit)
    }

    /// Receive every committed entry, failed attempts included.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEntry> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Currencies
    // -----------------------------------------------------------------------

    pub fn register_currency(&self, currency: CurrencyType) -> Result<(), LedgerError> {
        let code = currency.code.clone();
        self.write_state()?.currencies.register(currency)?;
        info!(currency = %code, "currency registered");
        Ok(())
    }

    pub fn set_currency_active(&self, code: &CurrencyCode, active: bool) -> Result<(), LedgerError> {
        self.write_state()?.currencies.set_active(code, active)?;
        info!(currency = %code, active, "currency activation changed");
        Ok(())
    }

    pub fn currencies(&self) -> Result<Vec<CurrencyType>, LedgerError> {
        Ok(self.read_state()?.currencies.iter().cloned().collect())
    }

    // -----------------------------------------------------------------------
    // Integrity holds
    // -----------------------------------------------------------------------

    pub fn is_frozen(&self, account: &AccountId) -> Result<bool, LedgerError> {
        Ok(self.read_state()?.frozen.contains(account))
    }

    /// Lift an integrity hold after manual review.
    ///
    /// Every balance of the account is rebuilt from the entry log and
    /// re-signed, so a tampered balance row is replaced by the value the log
    /// supports. Returns the rebuilt balances.
    pub fn clear_integrity_hold(&self, account: &AccountId) -> Result<Vec<Balance>, LedgerError> {
        let mut state = self.write_state()?;
        let keys: Vec<BalanceKey> = state
            .by_key
            .keys()
            .filter(|key| &key.account == account)
            .cloned()
            .collect();

        let mut rebuilt = Vec::with_capacity(keys.len());
        for key in keys {
            let entries = state.collect(state.by_key.get(&key));
            let balance = BalanceProjection::replay(&key, &entries, &self.guard);
            if balance.integrity_hash.is_unsigned() {
                state.balances.remove(&key);
            } else {
                state.balances.insert(key, balance.clone());
                rebuilt.push(balance);
            }
        }
        let was_frozen = state.frozen.remove(account);
        drop(state);

        warn!(%account, was_frozen, rebuilt = rebuilt.len(), "integrity hold cleared");
        Ok(rebuilt)
    }

    // -----------------------------------------------------------------------
    // Projection helpers
    // -----------------------------------------------------------------------

    /// Replay the log for one balance with this ledger's key.
    pub fn rebuild(&self, account: &AccountId, currency: &CurrencyCode) -> Result<Balance, LedgerError> {
        BalanceProjection::rebuild(self, &self.guard, account, currency)
    }

    /// Compare the stored balance against a rebuild.
    pub fn verify_projection(
        &self,
        account: &AccountId,
        currency: &CurrencyCode,
    ) -> Result<Balance, LedgerError> {
        BalanceProjection::verify(self, &self.guard, account, currency)
    }

    // -----------------------------------------------------------------------
    // Dump / restore
    // -----------------------------------------------------------------------

    pub fn export(&self) -> Result<LedgerDump, LedgerError> {
        let state = self.read_state()?;
        Ok(LedgerDump::new(
            state.currencies.iter().cloned().collect(),
            state.entries.clone(),
        ))
    }

    /// Load a dump into an empty ledger.
    ///
    /// Every entry hash is verified with this ledger's key and every applied
    /// entry must continue its balance; balances are rebuilt by replay.
    pub fn restore(self, dump: &LedgerDump) -> Result<Self, LedgerError> {
        let mut restored = LedgerState::default();
        for currency in &dump.currencies {
            restored.currencies.register(currency.clone())?;
        }

        let mut latest: Option<Timestamp> = None;
        for entry in &dump.entries {
            if !entry.verify(&self.guard) {
                return Err(LedgerError::IntegrityViolation {
                    account: entry.account.clone(),
                    currency: entry.currency.clone(),
                    detail: format!("entry {} hash mismatch", entry.id),
                });
            }
            if !entry.is_consistent() {
                return Err(LedgerError::Restore(format!(
                    "entry {} has inconsistent balance fields",
                    entry.id
                )));
            }
            if entry.status == EntryStatus::Pending {
                return Err(LedgerError::Restore(format!("entry {} is pending", entry.id)));
            }
            if restored.by_id.contains_key(&entry.id) {
                return Err(LedgerError::Restore(format!("duplicate entry {}", entry.id)));
            }
            if restored.currencies.get(&entry.currency).is_none() {
                return Err(LedgerError::UnknownCurrency(entry.currency.clone()));
            }

            if entry.is_applied() {
                let key = entry.key();
                let balance = restored
                    .balances
                    .entry(key.clone())
                    .or_insert_with(|| Balance::open(&key));
                if balance.current != entry.balance_before {
                    return Err(LedgerError::Restore(format!(
                        "entry {} starts at {} but {key} is {}",
                        entry.id, entry.balance_before, balance.current
                    )));
                }
                balance.apply(entry, &self.guard);
            }

            let seen = entry.processed.unwrap_or(entry.created).max(entry.created);
            latest = Some(latest.map_or(seen, |l| l.max(seen)));
            restored.push(entry.clone());
        }

        {
            let mut state = self.write_state()?;
            if !state.entries.is_empty() {
                return Err(LedgerError::Restore("ledger is not empty".into()));
            }
            *state = restored;
        }
        *self.hlc.lock().map_err(|_| LedgerError::LockPoisoned("clock"))? = latest;

        info!(entries = dump.entries.len(), currencies = dump.currencies.len(), "ledger restored");
        Ok(self)
    }

    // -----------------------------------------------------------------------
    // Append path
    // -----------------------------------------------------------------------

    /// Commit with bounded internal retries of transient failures.
    fn submit(&self, draft: &EntryDraft, parent: Option<EntryId>) -> Result<LedgerEntry, LedgerError> {
        let mut attempt = 0;
        loop {
            match self.try_commit(draft, parent) {
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!(account = %draft.account, currency = %draft.currency, attempt, error = %err, "retrying commit");
                    thread::yield_now();
                }
                other => return other,
            }
        }
    }

    fn try_commit(&self, draft: &EntryDraft, parent: Option<EntryId>) -> Result<LedgerEntry, LedgerError> {
        let key = draft.key();
        let _lock = self.locks.acquire(&key, self.config.lock_timeout())?;

        let (currency, stored, original) = {
            let state = self.read_state()?;
            if state.frozen.contains(&draft.account) {
                return Err(LedgerError::AccountFrozen(draft.account.clone()));
            }
            // Compensation must still run after a currency is deactivated.
            let currency = if parent.is_some() {
                state
                    .currencies
                    .get(&draft.currency)
                    .ok_or_else(|| LedgerError::UnknownCurrency(draft.currency.clone()))?
            } else {
                state.currencies.require_active(&draft.currency)?
            };
            let original = match parent {
                Some(id) => {
                    let index = *state.by_id.get(&id).ok_or(LedgerError::EntryNotFound(id))?;
                    Some(state.entries[index].clone())
                }
                None => None,
            };
            (currency.clone(), state.balances.get(&key).cloned(), original)
        };

        if let Some(balance) = &stored {
            if !balance.verify(&self.guard) {
                return Err(self.integrity_violation(&key, "stored balance hash mismatch"));
            }
        }

        // A reversal is priced from the locked, verified original.
        let amount = match &original {
            Some(original) => {
                if !original.verify(&self.guard) || original.key() != key {
                    let detail = format!("entry {} hash mismatch", original.id);
                    return Err(self.integrity_violation(&key, &detail));
                }
                ReversalPolicy::compensating_amount(original)?
            }
            None => draft.amount,
        };

        let balance_before = stored.as_ref().map_or(0, |b| b.current);
        let balance_after = balance_before.checked_add(amount).ok_or_else(|| {
            LedgerError::InvalidAmount(format!("{amount} on balance {balance_before} overflows"))
        })?;

        let mut entry = LedgerEntry {
            id: EntryId::new(),
            account: draft.account.clone(),
            currency: draft.currency.clone(),
            amount,
            balance_before,
            balance_after,
            kind: draft.kind,
            reference: draft.reference.clone(),
            status: EntryStatus::Pending,
            parent_id: parent,
            parent_created: original.as_ref().map(|o| o.created),
            reversal_id: None,
            memo: draft.memo.clone(),
            integrity_hash: IntegrityHash::UNSIGNED,
            created: self.next_timestamp()?,
            processed: None,
        };
        entry.sign(&self.guard);

        let screening = self.screen(&entry, &currency, stored.as_ref())?;
        entry.processed = Some(self.next_timestamp()?);

        match screening {
            Screening::Accept => {
                entry.status = EntryStatus::Completed;
                let expected_modified = stored.map(|b| b.last_modified);
                self.commit_applied(entry, expected_modified)
            }
            Screening::Reject(reason) => {
                entry.status = EntryStatus::Failed;
                self.commit_failed(entry, &reason)?;
                Err(reason)
            }
        }
    }

    /// Non-negative rule, then the limit pipeline. Reversals skip the limits.
    fn screen(
        &self,
        entry: &LedgerEntry,
        currency: &CurrencyType,
        stored: Option<&Balance>,
    ) -> Result<Screening, LedgerError> {
        if !currency.allow_negative && entry.amount < 0 && entry.balance_after < 0 {
            return Ok(Screening::Reject(LedgerError::InsufficientFunds {
                account: entry.account.clone(),
                currency: entry.currency.clone(),
                balance: entry.balance_before,
                requested: entry.amount,
            }));
        }

        if entry.kind == EntryKind::Reversal {
            return Ok(Screening::Accept);
        }

        let request = LimitRequest {
            account: &entry.account,
            currency,
            amount: entry.amount,
            kind: entry.kind,
            balance: stored.map(Balance::view).unwrap_or_default(),
            today: entry.created.utc_date(),
        };
        let verdict = self
            .gate
            .check(&request)
            .map_err(|e| LedgerError::LimitCheck(e.to_string()))?;

        match verdict.decision {
            LimitDecision::Allow => Ok(Screening::Accept),
            LimitDecision::Deny(reason) => {
                self.audit.record(AuditRecord {
                    at: entry.created,
                    account: entry.account.clone(),
                    event: AuditEvent::LimitDenied {
                        currency: entry.currency.clone(),
                        amount: entry.amount,
                        kind: entry.kind,
                        reason: reason.clone(),
                    },
                });
                Ok(Screening::Reject(LedgerError::LimitExceeded {
                    account: entry.account.clone(),
                    currency: entry.currency.clone(),
                    reason,
                }))
            }
        }
    }

    /// Store the entry and update its balance in one write-locked step.
    ///
    /// The stored balance must still be the one the entry was priced
    /// against; anything else is a `ConcurrencyConflict`.
    fn commit_applied(
        &self,
        entry: LedgerEntry,
        expected_modified: Option<Timestamp>,
    ) -> Result<LedgerEntry, LedgerError> {
        let key = entry.key();
        let mut state = self.write_state()?;

        let current = state.balances.get(&key);
        let actual = current.map_or(0, |b| b.current);
        if actual != entry.balance_before || current.map(|b| b.last_modified) != expected_modified {
            return Err(LedgerError::ConcurrencyConflict {
                account: key.account,
                currency: key.currency,
                expected: entry.balance_before,
                actual,
            });
        }

        if let Some(parent_id) = entry.parent_id {
            let index = *state
                .by_id
                .get(&parent_id)
                .ok_or(LedgerError::EntryNotFound(parent_id))?;
            ReversalPolicy::check(&state.entries[index])?;
            let original = &mut state.entries[index];
            original.status = EntryStatus::Reversed;
            original.reversal_id = Some(entry.id);
        }

        state
            .balances
            .entry(key.clone())
            .or_insert_with(|| Balance::open(&key))
            .apply(&entry, &self.guard);
        state.push(entry.clone());
        drop(state);

        debug!(
            entry = %entry.id.short_id(),
            account = %entry.account,
            currency = %entry.currency,
            kind = entry.kind.as_str(),
            amount = entry.amount,
            balance = entry.balance_after,
            "entry committed"
        );
        // No subscribers is not an error.
        let _ = self.events.send(entry.clone());
        Ok(entry)
    }

    fn commit_failed(&self, entry: LedgerEntry, reason: &LedgerError) -> Result<(), LedgerError> {
        self.write_state()?.push(entry.clone());
        warn!(
            entry = %entry.id.short_id(),
            account = %entry.account,
            currency = %entry.currency,
            kind = entry.kind.as_str(),
            amount = entry.amount,
            %reason,
            "entry rejected"
        );
        let _ = self.events.send(entry);
        Ok(())
    }

    /// Freeze the account, report, and build the error.
    fn integrity_violation(&self, key: &BalanceKey, detail: &str) -> LedgerError {
        if let Ok(mut state) = self.inner.write() {
            state.frozen.insert(key.account.clone());
        }
        error!(account = %key.account, currency = %key.currency, detail, "integrity violation; account frozen");
        let at = self
            .hlc
            .lock()
            .ok()
            .and_then(|last| *last)
            .unwrap_or_else(Timestamp::zero);
        self.audit.record(AuditRecord {
            at,
            account: key.account.clone(),
            event: AuditEvent::IntegrityViolation {
                currency: key.currency.clone(),
                detail: detail.to_string(),
            },
        });
        LedgerError::IntegrityViolation {
            account: key.account.clone(),
            currency: key.currency.clone(),
            detail: detail.to_string(),
        }
    }

    fn next_timestamp(&self) -> Result<Timestamp, LedgerError> {
        let mut last = self.hlc.lock().map_err(|_| LedgerError::LockPoisoned("clock"))?;
        let next = Timestamp::next_after(last.as_ref(), self.clock.now_ms(), self.config.node_id);
        *last = Some(next);
        Ok(next)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, LedgerState>, LedgerError> {
        self.inner.read().map_err(|_| LedgerError::LockPoisoned("state"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, LedgerError> {
        self.inner.write().map_err(|_| LedgerError::LockPoisoned("state"))
    }

    /// Direct state access for tests that simulate out-of-band tampering.
    #[cfg(test)]
    pub(crate) fn tamper<R>(&self, f: impl FnOnce(&mut LedgerState) -> R) -> R {
        let mut state = self.inner.write().unwrap();
        f(&mut *state)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default(), IntegrityGuard::ephemeral())
    }
}

impl LedgerWriter for InMemoryLedger {
    fn append(&self, draft: &EntryDraft) -> Result<LedgerEntry, LedgerError> {
        if draft.amount == 0 {
            return Err(LedgerError::InvalidAmount("amount must be nonzero".into()));
        }
        if draft.kind == EntryKind::Reversal {
            return Err(LedgerError::InvalidDraft(
                "reversal entries are created by reverse()".into(),
            ));
        }
        if draft.reference.external_id.trim().is_empty() {
            return Err(LedgerError::InvalidDraft("reference id is empty".into()));
        }
        self.submit(draft, None)
    }

    fn reverse(&self, entry_id: EntryId, reason: &str) -> Result<LedgerEntry, LedgerError> {
        let original = self
            .get_entry(entry_id)?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        let draft = ReversalPolicy::draft(&original, reason)?;
        let reversal = self.submit(&draft, Some(entry_id))?;
        info!(
            original = %entry_id.short_id(),
            reversal = %reversal.id.short_id(),
            account = %reversal.account,
            amount = reversal.amount,
            reason,
            "entry reversed"
        );
        Ok(reversal)
    }
}

impl LedgerReader for InMemoryLedger {
    fn get_entry(&self, id: EntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        let state = self.read_state()?;
        Ok(state.by_id.get(&id).map(|&i| state.entries[i].clone()))
    }

    fn entries_for(
        &self,
        account: &AccountId,
        currency: &CurrencyCode,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.read_state()?;
        let key = BalanceKey::new(account.clone(), currency.clone());
        Ok(state.collect(state.by_key.get(&key)))
    }

    fn entries_for_account(&self, account: &AccountId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.read_state()?;
        Ok(state.collect(state.by_account.get(account)))
    }

    fn entries_for_account_since(
        &self,
        account: &AccountId,
        since_ms: u64,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.read_state()?;
        Ok(state
            .by_account
            .get(account)
            .map(|ix| {
                ix.iter()
                    .map(|&i| &state.entries[i])
                    .filter(|e| e.created.physical_ms >= since_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn entries_by_reference(&self, reference: &Reference) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.read_state()?;
        Ok(state.collect(state.by_reference.get(reference)))
    }

    fn all_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.read_state()?.entries.clone())
    }

    fn balance(
        &self,
        account: &AccountId,
        currency: &CurrencyCode,
    ) -> Result<Option<Balance>, LedgerError> {
        let key = BalanceKey::new(account.clone(), currency.clone());
        Ok(self.read_state()?.balances.get(&key).cloned())
    }

    fn balances_for(&self, account: &AccountId) -> Result<Vec<Balance>, LedgerError> {
        Ok(self
            .read_state()?
            .balances
            .values()
            .filter(|b| &b.account == account)
            .cloned()
            .collect())
    }

    fn keys(&self) -> Result<Vec<BalanceKey>, LedgerError> {
        Ok(self.read_state()?.by_key.keys().cloned().collect())
    }

    fn currency(&self, code: &CurrencyCode) -> Result<Option<CurrencyType>, LedgerError> {
        Ok(self.read_state()?.currencies.get(code).cloned())
    }

    fn entry_count(&self) -> Result<usize, LedgerError> {
        Ok(self.read_state()?.entries.len())
    }
}
