//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::config::ConfigError;

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub first_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub factor: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            first_backoff_ms: 50,
            max_backoff_ms: 500,
            factor: 2,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.first_backoff_ms == 0 {
            return Err(ConfigError::invalid("backoff", "first_backoff_ms must be greater than 0"));
        }
        if self.max_backoff_ms < self.first_backoff_ms {
            return Err(ConfigError::invalid(
                "backoff",
                "max_backoff_ms must not be less than first_backoff_ms",
            ));
        }
        if self.factor == 0 {
            return Err(ConfigError::invalid("backoff", "factor must be greater than 0"));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.first_backoff_ms, self.max_backoff_ms, self.factor)
    }
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, factor: u32) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let multiplier = u64::from(factor).saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(multiplier);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
