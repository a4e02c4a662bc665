use std::time::Duration;

use crate::error::{ProvisionError, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_INTERVAL_MILLIS: u64 = 100;
const DEFAULT_MULTIPLIER: f64 = 2.0;
const DEFAULT_MAX_INTERVAL_MILLIS: u64 = 30_000;

/// Exponential backoff for whole reconciliation passes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of passes, the first one included.
    pub max_attempts: u32,
    /// Sleep after the first failed pass.
    pub initial_interval_millis: u64,
    /// Growth factor applied to the sleep after every further failure.
    pub multiplier: f64,
    /// Upper bound for any single sleep.
    pub max_interval_millis: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_interval_millis: DEFAULT_INITIAL_INTERVAL_MILLIS,
            multiplier: DEFAULT_MULTIPLIER,
            max_interval_millis: DEFAULT_MAX_INTERVAL_MILLIS,
        }
    }
}

impl RetryPolicy {
    /// Validates the policy, ensuring all values are within the supported bounds.
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(ProvisionError::validation(
                "retry.max_attempts must be between 1 and 10",
            ));
        }
        if !(100..=10_000).contains(&self.initial_interval_millis) {
            return Err(ProvisionError::validation(
                "retry.initial_interval_millis must be between 100 and 10000",
            ));
        }
        if !(1.0..=3.0).contains(&self.multiplier) {
            return Err(ProvisionError::validation(
                "retry.multiplier must be between 1 and 3",
            ));
        }
        if !(1..=60_000).contains(&self.max_interval_millis) {
            return Err(ProvisionError::validation(
                "retry.max_interval_millis must be between 1 and 60000",
            ));
        }
        Ok(())
    }

    /// Sleep that follows failed attempt `attempt` (1-based):
    /// `min(initial * multiplier^(attempt - 1), max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_interval_millis as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_interval_millis as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 1,
        }
    }
}

/// Attempt counter for one retried operation.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    /// The attempt currently running, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Records a failure of the current attempt. Returns how long to wait
    /// before the next one, or `None` once every attempt is used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay(self.attempt);
        self.attempt += 1;
        Some(delay)
    }
}
