//! Rate limiter configuration.

use serde::Deserialize;

use crate::config::ConfigError;

/// How tokens are returned to the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefillStyle {
    /// Tokens accrue continuously with elapsed time.
    #[default]
    Greedy,
    /// Tokens are added only for each whole second that has passed.
    Interval,
}

/// Validated token bucket parameters for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    replenish_rate: u32,
    burst_capacity: u32,
    requested_tokens: u32,
    refill: RefillStyle,
}

impl RateLimiterConfig {
    /// Fails when the rate is zero or the burst capacity is below the rate.
    pub fn new(replenish_rate: u32, burst_capacity: u32) -> Result<Self, ConfigError> {
        if replenish_rate == 0 {
            return Err(ConfigError::invalid("replenish_rate", "must be greater than 0"));
        }
        if burst_capacity < replenish_rate {
            return Err(ConfigError::invalid(
                "burst_capacity",
                format!(
                    "burst_capacity {} must be greater than or equal to replenish_rate {}",
                    burst_capacity, replenish_rate
                ),
            ));
        }

        Ok(Self {
            replenish_rate,
            burst_capacity,
            requested_tokens: 1,
            refill: RefillStyle::Greedy,
        })
    }

    pub fn with_requested_tokens(mut self, requested_tokens: u32) -> Result<Self, ConfigError> {
        if requested_tokens == 0 {
            return Err(ConfigError::invalid("requested_tokens", "must be greater than 0"));
        }
        self.requested_tokens = requested_tokens;
        Ok(self)
    }

    pub fn with_refill(mut self, refill: RefillStyle) -> Self {
        self.refill = refill;
        self
    }

    pub fn replenish_rate(&self) -> u32 {
        self.replenish_rate
    }

    pub fn burst_capacity(&self) -> u32 {
        self.burst_capacity
    }

    pub fn requested_tokens(&self) -> u32 {
        self.requested_tokens
    }

    pub fn refill(&self) -> RefillStyle {
        self.refill
    }
}
