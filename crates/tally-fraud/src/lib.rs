//! Fraud heuristics for the Tally economy ledger.
//!
//! [`FraudHeuristic::evaluate`] inspects an account's trailing ledger
//! activity, plus game-session timings from a [`GameActivity`] source, and
//! returns a [`FlagSet`]. It only reads. [`FraudMonitor`] runs the
//! heuristics on every committed entry and forwards new flag sets to the
//! ledger's [`AuditSink`](tally_ledger::AuditSink).

pub mod activity;
pub mod config;
pub mod error;
pub mod flags;
pub mod heuristic;
pub mod monitor;

pub use activity::{CompletedSession, GameActivity, MemoryActivity, NoActivity};
pub use config::FraudConfig;
pub use error::FraudError;
pub use flags::{FlagSet, FraudFlag};
pub use heuristic::FraudHeuristic;
pub use monitor::{FraudMonitor, MonitorStats};
