//! Many writers against shared balances.

use std::sync::Arc;
use std::thread;

use tally_crypto::{IntegrityGuard, IntegrityKey};
use tally_ledger::{
    EntryDraft, InMemoryLedger, LedgerAuditor, LedgerConfig, LedgerError, LedgerReader,
    LedgerWriter,
};
use tally_types::{AccountId, CurrencyCode, CurrencyType, EntryKind, EntryStatus, Reference};

fn coin() -> CurrencyCode {
    CurrencyCode::parse("COIN").unwrap()
}

fn ledger() -> Arc<InMemoryLedger> {
    let config = LedgerConfig {
        lock_timeout_ms: 5_000,
        ..Default::default()
    };
    let ledger = InMemoryLedger::new(config, IntegrityGuard::new(IntegrityKey::from_bytes([13; 32])));
    ledger.register_currency(CurrencyType::new(coin())).unwrap();
    Arc::new(ledger)
}

#[test]
fn parallel_deposits_sum_exactly() {
    let ledger = ledger();
    let shared = AccountId::new("guild-bank");

    let handles: Vec<_> = (0..16)
        .map(|t| {
            let ledger = ledger.clone();
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    ledger
                        .append(&EntryDraft::new(
                            shared.clone(),
                            coin(),
                            (t + 1) as i64,
                            EntryKind::Reward,
                            Reference::reward_claim(format!("t{t}-{i}")),
                        ))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected: i64 = (1..=16).map(|n| n * 50).sum();
    let balance = ledger.balance(&shared, &coin()).unwrap().unwrap();
    assert_eq!(balance.current, expected);
    assert_eq!(balance.lifetime_earned, expected);
    assert_eq!(ledger.entry_count().unwrap(), 800);

    let entries = ledger.entries_for(&shared, &coin()).unwrap();
    for pair in entries.windows(2) {
        assert_eq!(pair[0].balance_after, pair[1].balance_before);
        assert!(pair[0].created < pair[1].created);
    }
}

#[test]
fn racing_spends_never_overdraw() {
    let ledger = ledger();
    let wallet = AccountId::new("shared-wallet");
    ledger
        .append(&EntryDraft::new(
            wallet.clone(),
            coin(),
            1_000,
            EntryKind::Purchase,
            Reference::purchase("seed"),
        ))
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let ledger = ledger.clone();
            let wallet = wallet.clone();
            thread::spawn(move || {
                let mut spent = 0;
                for i in 0..40 {
                    let draft = EntryDraft::new(
                        wallet.clone(),
                        coin(),
                        -7,
                        EntryKind::Purchase,
                        Reference::purchase(format!("spend-{t}-{i}")),
                    );
                    match ledger.append(&draft) {
                        Ok(_) => spent += 7,
                        Err(LedgerError::InsufficientFunds { .. }) => {}
                        Err(other) => panic!("unexpected error {other}"),
                    }
                }
                spent
            })
        })
        .collect();
    let spent: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let balance = ledger.balance(&wallet, &coin()).unwrap().unwrap();
    assert_eq!(balance.current, 1_000 - spent);
    assert!(balance.current >= 0);
    assert!(balance.current < 7);

    let failed = ledger
        .entries_for(&wallet, &coin())
        .unwrap()
        .iter()
        .filter(|e| e.status == EntryStatus::Failed)
        .count();
    assert_eq!(failed, 320 - (spent / 7) as usize);

    let report = LedgerAuditor::validate(&*ledger, ledger.integrity_guard()).unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);
}
