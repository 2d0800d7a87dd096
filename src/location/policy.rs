use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one acquisition: how good a fix must be and how hard to try.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccuracyPolicy {
    /// A fix at or below this radius ends the acquisition and allows check-in.
    pub desired_accuracy_meters: f64,
    /// Total sensor calls one acquisition may make.
    pub max_attempts: u32,
    pub base_timeout_ms: u64,
    /// Added to the timeout for every attempt after the first.
    pub timeout_increment_ms: u64,
    pub retry_delay_ms: u64,
    pub high_accuracy: bool,
}

impl Default for AccuracyPolicy {
    fn default() -> Self {
        Self {
            desired_accuracy_meters: 100.0,
            max_attempts: 3,
            base_timeout_ms: 10_000,
            timeout_increment_ms: 5_000,
            retry_delay_ms: 500,
            high_accuracy: true,
        }
    }
}

impl AccuracyPolicy {
    /// Sensor timeout for the zero-based `attempt`.
    pub fn timeout_for_attempt(&self, attempt: u32) -> u64 {
        self.base_timeout_ms
            .saturating_add(self.timeout_increment_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn accepts(&self, accuracy_meters: f64) -> bool {
        accuracy_meters <= self.desired_accuracy_meters
    }

    /// At least one sensor call is always made.
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_grow_per_attempt() {
        let policy = AccuracyPolicy::default();
        assert_eq!(policy.timeout_for_attempt(0), 10_000);
        assert_eq!(policy.timeout_for_attempt(1), 15_000);
        assert_eq!(policy.timeout_for_attempt(2), 20_000);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let policy: AccuracyPolicy =
            serde_json::from_str(r#"{"desiredAccuracyMeters": 25.0}"#).unwrap();
        assert_eq!(policy.desired_accuracy_meters, 25.0);
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.high_accuracy);
        assert!(policy.accepts(25.0));
        assert!(!policy.accepts(25.5));
    }

    #[test]
    fn zero_attempts_still_calls_sensor_once() {
        let policy = AccuracyPolicy {
            max_attempts: 0,
            ..AccuracyPolicy::default()
        };
        assert_eq!(policy.effective_max_attempts(), 1);
    }
}
