//! Built-in limit stages.

pub mod daily_earn;
pub mod hold_cap;

pub use daily_earn::DailyEarnStage;
pub use hold_cap::HoldCapStage;
