use crate::error::GateError;
use crate::stage::{DenyReason, LimitRequest, LimitStage, StageDecision};

/// Daily earn cap stage.
///
/// Denies an earning request when the amount already earned today plus the
/// request would exceed the currency's daily cap. Spending is never limited.
pub struct DailyEarnStage;

impl LimitStage for DailyEarnStage {
    fn name(&self) -> &str {
        "daily_earn"
    }

    fn evaluate(&self, request: &LimitRequest<'_>) -> Result<StageDecision, GateError> {
        if !request.is_earn() || !request.currency.has_daily_cap() {
            return Ok(StageDecision::Pass);
        }

        let cap = request.currency.daily_earn_cap;
        let earned_today = request.balance.earned_on(request.today);
        let total = earned_today
            .checked_add(request.amount)
            .ok_or_else(|| GateError::overflow(self.name()))?;

        if total > cap {
            return Ok(StageDecision::Fail(DenyReason::DailyEarnCap {
                cap,
                earned_today,
                requested: request.amount,
            }));
        }

        Ok(StageDecision::Pass)
    }
}
