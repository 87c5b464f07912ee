use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FraudError;

/// Thresholds for the fraud heuristics. A threshold of zero disables its
/// flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    /// Trailing window used by the monitor.
    pub window_secs: u64,
    /// Purchases within the window at or above which the account is flagged.
    pub rapid_purchases: usize,
    /// Total earned (rewards and settlement credits) within the window.
    pub earn_velocity: i64,
    /// Completed sessions shorter than this count as fast.
    pub fast_completion_floor_ms: u64,
    pub fast_completions: usize,
    pub reversal_churn: usize,
    /// Rejected (failed) entries within the window.
    pub repeated_rejections: usize,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            window_secs: 3_600,
            rapid_purchases: 10,
            earn_velocity: 50_000,
            fast_completion_floor_ms: 30_000,
            fast_completions: 5,
            reversal_churn: 3,
            repeated_rejections: 5,
        }
    }
}

impl FraudConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn validate(&self) -> Result<(), FraudError> {
        if self.window_secs == 0 {
            return Err(FraudError::InvalidConfig("window_secs must be positive".into()));
        }
        if self.earn_velocity < 0 {
            return Err(FraudError::InvalidConfig(
                "earn_velocity must not be negative".into(),
            ));
        }
        if self.fast_completions > 0 && self.fast_completion_floor_ms == 0 {
            return Err(FraudError::InvalidConfig(
                "fast_completion_floor_ms must be positive when fast_completions is set".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = FraudConfig::default();
        config.validate().unwrap();
        assert_eq!(config.window(), Duration::from_secs(3_600));
    }

    #[test]
    fn zero_window_rejected() {
        let config = FraudConfig {
            window_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FraudError::InvalidConfig(_))));
    }

    #[test]
    fn parses_partial_toml() {
        let config: FraudConfig = toml::from_str("rapid_purchases = 3\nreversal_churn = 0\n").unwrap();
        assert_eq!(config.rapid_purchases, 3);
        assert_eq!(config.reversal_churn, 0);
        assert_eq!(config.window_secs, 3_600);
    }
}
