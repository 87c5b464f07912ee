use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::LimitConfig;
use crate::error::GateError;
use crate::stage::{DenyReason, LimitRequest, LimitStage, StageDecision, StageResult};
use crate::stages::{DailyEarnStage, HoldCapStage};

// ---------------------------------------------------------------------------
// LimitDecision / LimitVerdict
// ---------------------------------------------------------------------------

/// Final allow/deny decision for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LimitDecision {
    Allow,
    Deny(DenyReason),
}

/// The outcome of running a request through the full limit pipeline.
#[derive(Clone, Debug)]
pub struct LimitVerdict {
    pub decision: LimitDecision,
    /// Per-stage results in evaluation order. Empty when the request was
    /// exempt.
    pub stage_results: Vec<StageResult>,
    /// Total wall-clock time for the pipeline evaluation.
    pub elapsed: Duration,
}

impl LimitVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self.decision, LimitDecision::Allow)
    }

    /// The deny reason, if the request was denied.
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match &self.decision {
            LimitDecision::Allow => None,
            LimitDecision::Deny(reason) => Some(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// LimitGate
// ---------------------------------------------------------------------------

/// The limit enforcer: a configurable pipeline of stages that every earning
/// write passes through before it is committed.
///
/// The gate is pure. It reads the balance view carried by the request and
/// never mutates state; the ledger applies the counters after commit.
pub struct LimitGate {
    stages: Vec<Box<dyn LimitStage>>,
    config: LimitConfig,
}

impl LimitGate {
    /// Create a gate with an empty pipeline.
    pub fn new(config: LimitConfig) -> Self {
        Self {
            stages: Vec::new(),
            config,
        }
    }

    /// Create a gate with the default pipeline: DailyEarn -> HoldCap
    pub fn with_default_stages(config: LimitConfig) -> Self {
        let mut gate = Self::new(config);
        gate.add_stage(Box::new(DailyEarnStage));
        gate.add_stage(Box::new(HoldCapStage));
        gate
    }

    pub fn add_stage(&mut self, stage: Box<dyn LimitStage>) {
        self.stages.push(stage);
    }

    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Evaluate a request through the pipeline.
    ///
    /// The pipeline is fail-fast: the first failing stage stops evaluation
    /// and produces a `Deny` decision.
    pub fn check(&self, request: &LimitRequest<'_>) -> Result<LimitVerdict, GateError> {
        let pipeline_start = Instant::now();

        if self.config.is_exempt(request.account, request.kind) {
            debug!(
                account = %request.account,
                kind = request.kind.as_str(),
                "limit check skipped for exempt request"
            );
            return Ok(LimitVerdict {
                decision: LimitDecision::Allow,
                stage_results: Vec::new(),
                elapsed: pipeline_start.elapsed(),
            });
        }

        let mut stage_results = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let stage_start = Instant::now();
            let decision = stage.evaluate(request)?;

            let (passed, reason) = match &decision {
                StageDecision::Pass => (true, None),
                StageDecision::Fail(reason) => (false, Some(reason.clone())),
            };
            stage_results.push(StageResult {
                stage_name: stage.name().to_string(),
                passed,
                reason,
                elapsed: stage_start.elapsed(),
            });

            if let StageDecision::Fail(reason) = decision {
                warn!(
                    account = %request.account,
                    currency = %request.currency.code,
                    amount = request.amount,
                    stage = stage.name(),
                    %reason,
                    "limit denied"
                );
                return Ok(LimitVerdict {
                    decision: LimitDecision::Deny(reason),
                    stage_results,
                    elapsed: pipeline_start.elapsed(),
                });
            }
        }

        Ok(LimitVerdict {
            decision: LimitDecision::Allow,
            stage_results,
            elapsed: pipeline_start.elapsed(),
        })
    }
}

impl Default for LimitGate {
    fn default() -> Self {
        Self::with_default_stages(LimitConfig::default())
    }
}
