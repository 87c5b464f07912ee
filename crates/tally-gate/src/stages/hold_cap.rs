use crate::error::GateError;
use crate::stage::{DenyReason, LimitRequest, LimitStage, StageDecision};

/// Total hold cap stage.
///
/// Denies an earning request when the resulting balance would exceed the
/// currency's hold cap.
pub struct HoldCapStage;

impl LimitStage for HoldCapStage {
    fn name(&self) -> &str {
        "hold_cap"
    }

    fn evaluate(&self, request: &LimitRequest<'_>) -> Result<StageDecision, GateError> {
        if !request.is_earn() || !request.currency.has_hold_cap() {
            return Ok(StageDecision::Pass);
        }

        let cap = request.currency.total_hold_cap;
        let balance_after = request
            .balance
            .current
            .checked_add(request.amount)
            .ok_or_else(|| GateError::overflow(self.name()))?;

        if balance_after > cap {
            return Ok(StageDecision::Fail(DenyReason::HoldCap { cap, balance_after }));
        }

        Ok(StageDecision::Pass)
    }
}
