use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Creation timestamp of a ledger entry.
///
/// Combines a wall-clock millisecond component with a logical counter and a
/// node identifier, so entries created within the same millisecond still
/// have a strict total order.
///
/// Ordering: `physical_ms` → `logical` → `node_id`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Wall-clock milliseconds since UNIX epoch.
    pub physical_ms: u64,
    /// Logical counter for events at the same physical time.
    pub logical: u32,
    /// Node identifier to break ties between writers.
    pub node_id: u16,
}

impl Timestamp {
    pub fn new(physical_ms: u64, logical: u32, node_id: u16) -> Self {
        Self {
            physical_ms,
            logical,
            node_id,
        }
    }

    /// The zero timestamp (UNIX epoch).
    pub const fn zero() -> Self {
        Self {
            physical_ms: 0,
            logical: 0,
            node_id: 0,
        }
    }

    /// The next timestamp strictly after `previous` given the current
    /// wall-clock reading. A clock that moved backwards is ignored.
    pub fn next_after(previous: Option<&Self>, now_ms: u64, node_id: u16) -> Self {
        match previous {
            None => Self::new(now_ms, 0, node_id),
            Some(prev) if now_ms > prev.physical_ms => Self::new(now_ms, 0, node_id),
            Some(prev) => Self::new(prev.physical_ms, prev.logical.saturating_add(1), node_id),
        }
    }

    /// The UTC calendar date this timestamp falls on.
    pub fn utc_date(&self) -> NaiveDate {
        utc_date_of(self.physical_ms)
    }

    /// Milliseconds elapsed between `earlier` and `self` (0 if not after).
    pub fn millis_since(&self, earlier: &Self) -> u64 {
        self.physical_ms.saturating_sub(earlier.physical_ms)
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(i64::try_from(self.physical_ms).ok()?)
    }
}

/// UTC calendar date of a millisecond UNIX timestamp.
pub fn utc_date_of(physical_ms: u64) -> NaiveDate {
    i64::try_from(physical_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.physical_ms
            .cmp(&other.physical_ms)
            .then(self.logical.cmp(&other.logical))
            .then(self.node_id.cmp(&other.node_id))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timestamp({}ms.{}.n{})",
            self.physical_ms, self.logical, self.node_id
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}.{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ"), self.logical),
            None => write!(f, "{}.{}.n{}", self.physical_ms, self.logical, self.node_id),
        }
    }
}

/// Source of wall-clock time for the ledger.
///
/// The core holds no timers; daily counters are reset lazily by comparing
/// dates derived from this clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since UNIX epoch.
    fn now_ms(&self) -> u64;

    fn today(&self) -> NaiveDate {
        utc_date_of(self.now_ms())
    }
}

/// Clock backed by [`SystemTime`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    /// A clock set to midnight UTC of the given date.
    pub fn at_date(date: NaiveDate) -> Self {
        let ms = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0);
        Self::new(u64::try_from(ms).unwrap_or(0))
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta: u64) {
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: u64) {
        self.advance_ms(days * 24 * 60 * 60 * 1000);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
