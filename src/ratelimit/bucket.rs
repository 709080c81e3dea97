//! The token bucket step.
//!
//! A pure function over the stored state so that every store applies the
//! same arithmetic, whether it runs in-process or as a server-side script.

use std::time::Duration;

use crate::ratelimit::config::{RateLimiterConfig, RefillStyle};

/// Persisted bucket state. Tokens and timestamp are always written together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub tokens: f64,
    pub refreshed_at: Duration,
}

/// Inputs of one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketRequest {
    pub rate: f64,
    pub capacity: f64,
    pub requested: f64,
    pub refill: RefillStyle,
    pub now: Duration,
}

impl BucketRequest {
    pub fn new(config: &RateLimiterConfig, now: Duration) -> Self {
        Self {
            rate: f64::from(config.replenish_rate()),
            capacity: f64::from(config.burst_capacity()),
            requested: f64::from(config.requested_tokens()),
            refill: config.refill(),
            now,
        }
    }

    /// How long an idle bucket must be kept: the time to refill it twice.
    pub fn ttl(&self) -> Duration {
        let secs = (2.0 * self.capacity / self.rate).floor().max(1.0);
        Duration::from_secs(secs as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketOutcome {
    pub allowed: bool,
    /// Whole tokens left after the check.
    pub tokens_left: i64,
}

/// Refill the bucket for the elapsed time and try to take `requested` tokens.
///
/// A missing state is a full bucket. A denied check still persists the
/// refilled state, leaving the token count unchanged by the request.
pub fn step(state: Option<BucketState>, request: &BucketRequest) -> (BucketState, BucketOutcome) {
    let state = state.unwrap_or(BucketState {
        tokens: request.capacity,
        refreshed_at: request.now,
    });

    let elapsed = request.now.saturating_sub(state.refreshed_at);
    let (filled, refreshed_at) = match request.refill {
        RefillStyle::Greedy => (
            state.tokens + elapsed.as_secs_f64() * request.rate,
            request.now,
        ),
        RefillStyle::Interval => {
            let intervals = elapsed.as_secs();
            (
                state.tokens + intervals as f64 * request.rate,
                state.refreshed_at + Duration::from_secs(intervals),
            )
        }
    };
    let filled = filled.min(request.capacity);

    let allowed = filled >= request.requested;
    let tokens = if allowed {
        filled - request.requested
    } else {
        filled
    };

    (
        BucketState {
            tokens,
            refreshed_at,
        },
        BucketOutcome {
            allowed,
            tokens_left: tokens.floor() as i64,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(rate: u32, capacity: u32, requested: u32, now: Duration) -> BucketRequest {
        let config = RateLimiterConfig::new(rate, capacity)
            .unwrap()
            .with_requested_tokens(requested)
            .unwrap();
        BucketRequest::new(&config, now)
    }

    #[test]
    fn test_burst_then_deny() {
        let now = Duration::from_secs(1_000);
        let req = request(10, 20, 1, now);
        let mut state = None;

        for expected_left in (0..20).rev() {
            let (next, outcome) = step(state, &req);
            assert!(outcome.allowed);
            assert_eq!(outcome.tokens_left, expected_left);
            state = Some(next);
        }

        let (next, outcome) = step(state, &req);
        assert!(!outcome.allowed);
        assert_eq!(outcome.tokens_left, 0);
        assert!(next.tokens >= 0.0);
    }

    #[test]
    fn test_steady_state_allows_one_per_refill() {
        let start = Duration::from_secs(1_000);
        let mut state = None;
        for _ in 0..2 {
            let (next, outcome) = step(state, &request(2, 2, 1, start));
            assert!(outcome.allowed);
            state = Some(next);
        }
        assert!(!step(state, &request(2, 2, 1, start)).1.allowed);

        // requested / rate = 0.5s buys exactly one more token
        let later = start + Duration::from_millis(500);
        let (next, outcome) = step(state, &request(2, 2, 1, later));
        assert!(outcome.allowed);
        assert!(!step(Some(next), &request(2, 2, 1, later)).1.allowed);
    }

    #[test]
    fn test_tokens_never_exceed_capacity() {
        let req = request(5, 10, 1, Duration::from_secs(10));
        let idle = BucketState {
            tokens: 3.0,
            refreshed_at: Duration::from_secs(0),
        };
        let (next, outcome) = step(Some(idle), &req);
        assert!(outcome.allowed);
        assert_eq!(next.tokens, 9.0);
    }

    #[test]
    fn test_denied_request_does_not_consume() {
        let req = request(1, 5, 3, Duration::from_secs(100));
        let low = BucketState {
            tokens: 2.0,
            refreshed_at: Duration::from_secs(100),
        };
        let (next, outcome) = step(Some(low), &req);
        assert!(!outcome.allowed);
        assert_eq!(next.tokens, 2.0);
        assert_eq!(outcome.tokens_left, 2);
    }

    #[test]
    fn test_interval_refill_counts_whole_seconds() {
        let mut req = request(4, 8, 1, Duration::from_millis(10_900));
        req.refill = RefillStyle::Interval;
        let empty = BucketState {
            tokens: 0.0,
            refreshed_at: Duration::from_secs(10),
        };

        // 0.9s elapsed: nothing refilled yet
        let (next, outcome) = step(Some(empty), &req);
        assert!(!outcome.allowed);
        assert_eq!(next.refreshed_at, Duration::from_secs(10));

        req.now = Duration::from_millis(11_200);
        let (next, outcome) = step(Some(next), &req);
        assert!(outcome.allowed);
        assert_eq!(outcome.tokens_left, 3);
        assert_eq!(next.refreshed_at, Duration::from_secs(11));
    }

    #[test]
    fn test_ttl_is_twice_fill_time() {
        assert_eq!(request(10, 20, 1, Duration::ZERO).ttl(), Duration::from_secs(4));
        assert_eq!(request(100, 100, 1, Duration::ZERO).ttl(), Duration::from_secs(2));
        assert_eq!(request(1000, 1000, 1, Duration::ZERO).ttl(), Duration::from_secs(2));
    }
}
