//! Settlement flows across the ledger, limit gate, and coordinator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use tally_crypto::{IntegrityGuard, IntegrityKey};
use tally_gate::{LimitConfig, LimitGate};
use tally_ledger::{
    EntryDraft, InMemoryLedger, LedgerAuditor, LedgerConfig, LedgerReader, LedgerWriter,
};
use tally_settlement::{SettlementConfig, SettlementCoordinator, SettlementState};
use tally_types::{AccountId, CurrencyCode, CurrencyType, EntryKind, Reference, SessionId};

fn gem() -> CurrencyCode {
    CurrencyCode::parse("GEM").unwrap()
}

fn ledger(currency: CurrencyType, limits: LimitConfig) -> Arc<InMemoryLedger> {
    let config = LedgerConfig {
        lock_timeout_ms: 2_000,
        ..Default::default()
    };
    let ledger = InMemoryLedger::new(config, IntegrityGuard::new(IntegrityKey::from_bytes([11; 32])))
        .with_limit_gate(LimitGate::with_default_stages(limits));
    ledger.register_currency(currency).unwrap();
    Arc::new(ledger)
}

fn fund(ledger: &InMemoryLedger, account: &AccountId, amount: i64) {
    ledger
        .append(&EntryDraft::new(
            account.clone(),
            gem(),
            amount,
            EntryKind::Purchase,
            Reference::purchase(format!("topup-{account}")),
        ))
        .unwrap();
}

fn total(ledger: &InMemoryLedger) -> i64 {
    ledger
        .keys()
        .unwrap()
        .iter()
        .map(|k| ledger.balance(&k.account, &k.currency).unwrap().map_or(0, |b| b.current))
        .sum()
}

#[test]
fn concurrent_sessions_conserve_currency() {
    let ledger = ledger(CurrencyType::new(gem()), LimitConfig::default());
    let roster: Vec<AccountId> = (0..6).map(|i| AccountId::new(format!("player-{i}"))).collect();
    for account in &roster {
        fund(&ledger, account, 100_000);
    }
    let funded = total(&ledger);

    let coordinator = Arc::new(
        SettlementCoordinator::new(ledger.clone(), SettlementConfig::default()).unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let coordinator = coordinator.clone();
            let roster = roster.clone();
            thread::spawn(move || {
                for round in 0..5 {
                    let session = SessionId::new(format!("t{t}-r{round}"));
                    let players: Vec<AccountId> =
                        (0..4).map(|i| roster[(t + round + i) % roster.len()].clone()).collect();
                    coordinator
                        .session_started(&session, &players, 25 + t as i64, &gem())
                        .unwrap();
                    let mut ranking = players.clone();
                    ranking.rotate_left(round % 4);
                    coordinator
                        .session_completed(&session, &ranking, &BTreeMap::new())
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reports = coordinator.reports().unwrap();
    assert_eq!(reports.len(), 40);
    for report in &reports {
        assert_eq!(report.state, SettlementState::Settled, "{:?}", report.failure);
        assert_eq!(report.credited() + report.commission, report.pool);
    }
    assert_eq!(total(&ledger), funded);

    let audit = LedgerAuditor::validate(&*ledger, ledger.integrity_guard()).unwrap();
    assert!(audit.is_valid(), "{:?}", audit.violations);
}

#[test]
fn exempt_house_collects_commission_past_hold_cap() {
    let house = AccountId::new("house");
    let ledger = ledger(
        CurrencyType::new(gem()).with_total_hold_cap(150),
        LimitConfig::default().with_exempt_account(house.clone()),
    );
    let players: Vec<AccountId> = ["ann", "ben"].into_iter().map(AccountId::new).collect();
    for account in &players {
        fund(&ledger, account, 100);
    }
    let coordinator =
        SettlementCoordinator::new(ledger.clone(), SettlementConfig::winner_takes_all()).unwrap();

    for round in 0..80 {
        let session = SessionId::new(format!("duel-{round}"));
        coordinator.session_started(&session, &players, 10, &gem()).unwrap();
        // Alternate winners so neither player crosses the cap.
        let mut ranking = players.clone();
        ranking.rotate_left(round % 2);
        let report = coordinator
            .session_completed(&session, &ranking, &BTreeMap::new())
            .unwrap();
        assert!(report.is_settled(), "{:?}", report.failure);
    }

    let house_balance = ledger.balance(&house, &gem()).unwrap().unwrap().current;
    assert_eq!(house_balance, 80 * 2);
    assert!(house_balance > 150);
    for account in &players {
        assert_eq!(ledger.balance(account, &gem()).unwrap().unwrap().current, 20);
    }
}

#[test]
fn leaderboard_reads_session_entries() {
    let ledger = ledger(CurrencyType::new(gem()), LimitConfig::default());
    let players: Vec<AccountId> = ["ann", "ben", "cat"].into_iter().map(AccountId::new).collect();
    for account in &players {
        fund(&ledger, account, 500);
    }
    let coordinator =
        SettlementCoordinator::new(ledger.clone(), SettlementConfig::default()).unwrap();
    let session = SessionId::new("cup-final");
    coordinator.session_started(&session, &players, 100, &gem()).unwrap();
    let report = coordinator
        .session_completed(&session, &players, &BTreeMap::new())
        .unwrap();

    let legs = ledger.entries_by_reference(&Reference::session(&session)).unwrap();
    let ids: Vec<_> = legs.iter().map(|e| e.id).collect();
    assert_eq!(ids, report.entries);
    let credited: i64 = legs.iter().filter(|e| e.amount > 0).map(|e| e.amount).sum();
    assert_eq!(credited, report.pool);
}
