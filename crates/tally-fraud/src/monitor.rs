//! Background task that runs the heuristics on every committed entry.

use std::collections::HashMap;
use std::sync::Arc;

use tally_ledger::{AuditEvent, AuditRecord, AuditSink, LedgerEntry, LedgerReader};
use tally_types::AccountId;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::activity::GameActivity;
use crate::error::FraudError;
use crate::heuristic::FraudHeuristic;

/// Counters reported when the monitor stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Entries received from the ledger.
    pub events: u64,
    /// Flag sets forwarded to the audit sink.
    pub forwarded: u64,
    /// Entries dropped because the monitor fell behind.
    pub lagged: u64,
    pub errors: u64,
}

/// Subscribes to the ledger's entry broadcast and forwards new flag sets to
/// the security-audit sink.
///
/// A flag set is forwarded when it differs from the last one forwarded for
/// the same account, so a burst of activity yields one record per change.
pub struct FraudMonitor {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<MonitorStats>,
}

impl FraudMonitor {
    /// Start the monitor on the current tokio runtime.
    pub fn spawn<R>(
        reader: Arc<R>,
        events: broadcast::Receiver<LedgerEntry>,
        activity: Arc<dyn GameActivity>,
        heuristic: FraudHeuristic,
        audit: Arc<dyn AuditSink>,
    ) -> Self
    where
        R: LedgerReader + ?Sized + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = Worker {
            reader,
            activity,
            heuristic,
            audit,
            last: HashMap::new(),
            stats: MonitorStats::default(),
        };
        let task = tokio::spawn(worker.run(events, shutdown_rx));
        info!("fraud monitor started");
        Self { shutdown, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop after draining entries already delivered, and return the
    /// counters.
    pub async fn shutdown(self) -> Result<MonitorStats, FraudError> {
        // The task may already have exited on a closed channel.
        let _ = self.shutdown.send(true);
        let stats = self
            .task
            .await
            .map_err(|e| FraudError::Monitor(e.to_string()))?;
        info!(
            events = stats.events,
            forwarded = stats.forwarded,
            lagged = stats.lagged,
            "fraud monitor stopped"
        );
        Ok(stats)
    }
}

struct Worker<R: ?Sized> {
    reader: Arc<R>,
    activity: Arc<dyn GameActivity>,
    heuristic: FraudHeuristic,
    audit: Arc<dyn AuditSink>,
    last: HashMap<AccountId, Vec<String>>,
    stats: MonitorStats,
}

impl<R: LedgerReader + ?Sized + 'static> Worker<R> {
    async fn run(
        mut self,
        mut events: broadcast::Receiver<LedgerEntry>,
        mut shutdown: watch::Receiver<bool>,
    ) -> MonitorStats {
        loop {
            tokio::select! {
                biased;

                received = events.recv() => match received {
                    Ok(entry) => {
                        self.stats.events += 1;
                        self.inspect(&entry).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "fraud monitor lagged behind the ledger");
                        self.stats.lagged += skipped;
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        self.stats
    }

    async fn inspect(&mut self, entry: &LedgerEntry) {
        // Ledger reads take blocking locks; keep them off the async workers.
        let reader = Arc::clone(&self.reader);
        let activity = Arc::clone(&self.activity);
        let heuristic = self.heuristic.clone();
        let account = entry.account.clone();
        let now_ms = entry.created.physical_ms;
        let result = task::spawn_blocking(move || {
            let window = heuristic.config().window();
            heuristic.evaluate(reader.as_ref(), activity.as_ref(), &account, window, now_ms)
        })
        .await
        .map_err(|e| FraudError::Monitor(e.to_string()))
        .and_then(|evaluated| evaluated);
        let set = match result {
            Ok(set) => set,
            Err(err) => {
                warn!(account = %entry.account, error = %err, "fraud evaluation failed");
                self.stats.errors += 1;
                return;
            }
        };

        let flags = set.describe();
        if set.is_empty() {
            self.last.remove(&entry.account);
            return;
        }
        if self.last.get(&entry.account) == Some(&flags) {
            debug!(account = %entry.account, "fraud flags unchanged");
            return;
        }

        warn!(account = %entry.account, flags = ?flags, "fraud flags raised");
        self.audit.record(AuditRecord {
            at: entry.created,
            account: entry.account.clone(),
            event: AuditEvent::FraudFlags {
                window_secs: set.window_secs,
                flags: flags.clone(),
            },
        });
        self.last.insert(entry.account.clone(), flags);
        self.stats.forwarded += 1;
    }
}

#[cfg(test)]
mod tests {
    use tally_crypto::{IntegrityGuard, IntegrityKey};
    use tally_ledger::{EntryDraft, InMemoryLedger, LedgerConfig, LedgerWriter, MemoryAuditLog};
    use tally_types::{CurrencyCode, CurrencyType, EntryKind, ManualClock, Reference};

    use super::*;
    use crate::activity::NoActivity;
    use crate::config::FraudConfig;

    fn coin() -> CurrencyCode {
        CurrencyCode::parse("COIN").unwrap()
    }

    fn ledger(capacity: usize) -> Arc<InMemoryLedger> {
        let config = LedgerConfig {
            broadcast_capacity: capacity,
            ..Default::default()
        };
        let ledger = InMemoryLedger::new(config, IntegrityGuard::new(IntegrityKey::from_bytes([8; 32])))
            .with_clock(Arc::new(ManualClock::new(1_700_000_000_000)));
        ledger.register_currency(CurrencyType::new(coin())).unwrap();
        Arc::new(ledger)
    }

    fn purchase(ledger: &InMemoryLedger, account: &str, n: usize) {
        ledger
            .append(&EntryDraft::new(
                AccountId::new(account),
                coin(),
                25,
                EntryKind::Purchase,
                Reference::purchase(format!("{account}-{n}")),
            ))
            .unwrap();
    }

    fn spawn(ledger: &Arc<InMemoryLedger>, audit: &Arc<MemoryAuditLog>, rapid: usize) -> FraudMonitor {
        let heuristic = FraudHeuristic::new(FraudConfig {
            rapid_purchases: rapid,
            ..Default::default()
        })
        .unwrap();
        FraudMonitor::spawn(
            ledger.clone(),
            ledger.subscribe(),
            Arc::new(NoActivity),
            heuristic,
            audit.clone(),
        )
    }

    #[tokio::test]
    async fn forwards_flags_once_per_change() {
        let ledger = ledger(64);
        let audit = Arc::new(MemoryAuditLog::new());
        let monitor = spawn(&ledger, &audit, 3);

        for n in 0..4 {
            purchase(&ledger, "mallory", n);
        }
        purchase(&ledger, "alice", 0);

        let stats = monitor.shutdown().await.unwrap();
        assert_eq!(stats.events, 5);
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.errors, 0);

        let records = audit.records_for(&AccountId::new("mallory"));
        assert_eq!(records.len(), 1);
        match &records[0].event {
            AuditEvent::FraudFlags { window_secs, flags } => {
                assert_eq!(*window_secs, 3_600);
                // every purchase shares one millisecond, so the first
                // evaluation already sees all four
                assert_eq!(flags, &vec!["rapid_purchases: 4 purchases (threshold 3)".to_string()]);
            }
            other => panic!("unexpected audit event {other:?}"),
        }
        assert!(audit.records_for(&AccountId::new("alice")).is_empty());
    }

    #[tokio::test]
    async fn lagging_receiver_counts_skipped_entries() {
        let ledger = ledger(2);
        let audit = Arc::new(MemoryAuditLog::new());
        let monitor = spawn(&ledger, &audit, 0);

        // Nothing yields to the monitor task until shutdown is awaited.
        for n in 0..10 {
            purchase(&ledger, "bob", n);
        }

        let stats = monitor.shutdown().await.unwrap();
        assert_eq!(stats.lagged, 8);
        assert_eq!(stats.events, 2);
        assert!(audit.is_empty());
    }

    #[tokio::test]
    async fn stops_when_ledger_is_dropped() {
        let ledger = ledger(8);
        let events = ledger.subscribe();
        let reader: Arc<InMemoryLedger> = Arc::new(InMemoryLedger::default());
        let monitor = FraudMonitor::spawn(
            reader,
            events,
            Arc::new(NoActivity),
            FraudHeuristic::new(FraudConfig::default()).unwrap(),
            Arc::new(MemoryAuditLog::new()),
        );
        drop(ledger);

        let stats = monitor.shutdown().await.unwrap();
        assert_eq!(stats, MonitorStats::default());
    }
}
