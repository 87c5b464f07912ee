//! Append-only security-audit records.
//!
//! Limit denials, integrity violations, and fraud flags are forwarded to an
//! [`AuditSink`]. The sink never feeds back into ledger decisions.

use std::fmt;
use std::sync::Mutex;

use tally_gate::DenyReason;
use tally_types::{AccountId, CurrencyCode, EntryKind, Timestamp};
use tracing::{error, warn};

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuditEvent {
    LimitDenied {
        currency: CurrencyCode,
        amount: i64,
        kind: EntryKind,
        reason: DenyReason,
    },
    IntegrityViolation {
        currency: CurrencyCode,
        detail: String,
    },
    FraudFlags {
        window_secs: u64,
        flags: Vec<String>,
    },
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LimitDenied {
                currency,
                amount,
                kind,
                reason,
            } => write!(f, "limit denied: {kind} {amount} {currency}: {reason}"),
            Self::IntegrityViolation { currency, detail } => {
                write!(f, "integrity violation on {currency}: {detail}")
            }
            Self::FraudFlags { window_secs, flags } => {
                write!(f, "fraud flags over {window_secs}s: {}", flags.join(", "))
            }
        }
    }
}

/// One audit record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditRecord {
    pub at: Timestamp,
    pub account: AccountId,
    pub event: AuditEvent,
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.at, self.account, self.event)
    }
}

/// Receiver of audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Sink that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        match &record.event {
            AuditEvent::IntegrityViolation { .. } => {
                error!(account = %record.account, event = %record.event, "audit");
            }
            _ => {
                warn!(account = %record.account, event = %record.event, "audit");
            }
        }
    }
}

/// In-memory audit log.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record in arrival order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn records_for(&self, account: &AccountId) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| &r.account == account)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, record: AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
