//! Token bucket rate limiter with per-route configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::clock::Clock;
use crate::config::RateLimiterSettings;
use crate::ratelimit::bucket::BucketRequest;
use crate::ratelimit::config::RateLimiterConfig;
use crate::ratelimit::store::{BucketKeys, RateLimitStore};

/// Result of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResponse {
    pub allowed: bool,
    /// Tokens left, or -1 when the store could not be consulted.
    pub tokens_remaining: i64,
    /// Diagnostic headers to add to the response (may be empty).
    pub headers: BTreeMap<String, String>,
}

#[async_trait]
pub trait RateLimiter: Send + Sync + fmt::Debug {
    async fn is_allowed(&self, route_id: &str, id: &str) -> RateLimitResponse;
}

/// Names of the diagnostic headers and whether to emit them.
#[derive(Debug, Clone)]
pub struct RateLimitHeaders {
    pub include: bool,
    pub remaining: String,
    pub replenish_rate: String,
    pub burst_capacity: String,
    pub requested_tokens: String,
}

impl From<&RateLimiterSettings> for RateLimitHeaders {
    fn from(settings: &RateLimiterSettings) -> Self {
        Self {
            include: settings.include_headers,
            remaining: settings.remaining_header.clone(),
            replenish_rate: settings.replenish_rate_header.clone(),
            burst_capacity: settings.burst_capacity_header.clone(),
            requested_tokens: settings.requested_tokens_header.clone(),
        }
    }
}

impl Default for RateLimitHeaders {
    fn default() -> Self {
        Self::from(&RateLimiterSettings::default())
    }
}

impl RateLimitHeaders {
    /// Headers describing the configuration that produced the decision.
    fn render(&self, config: &RateLimiterConfig, remaining: i64) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if !self.include {
            return headers;
        }
        headers.insert(self.remaining.clone(), remaining.to_string());
        headers.insert(self.replenish_rate.clone(), config.replenish_rate().to_string());
        headers.insert(self.burst_capacity.clone(), config.burst_capacity().to_string());
        headers.insert(self.requested_tokens.clone(), config.requested_tokens().to_string());
        headers
    }
}

/// A [`RateLimiter`] running the token bucket step on a [`RateLimitStore`].
///
/// Store failures fail open: the request is allowed and the remaining
/// header reports `-1`.
#[derive(Debug)]
pub struct TokenBucketRateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    default_config: RateLimiterConfig,
    configs: DashMap<String, RateLimiterConfig>,
    headers: RateLimitHeaders,
}

impl TokenBucketRateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        default_config: RateLimiterConfig,
        headers: RateLimitHeaders,
    ) -> Self {
        Self {
            store,
            clock,
            default_config,
            configs: DashMap::new(),
            headers,
        }
    }

    /// Register the configuration used for `route_id`.
    pub fn configure(&self, route_id: &str, config: RateLimiterConfig) {
        self.configs.insert(route_id.to_string(), config);
    }

    pub fn config_for(&self, route_id: &str) -> RateLimiterConfig {
        self.configs
            .get(route_id)
            .map(|c| *c)
            .unwrap_or(self.default_config)
    }
}

#[async_trait]
impl RateLimiter for TokenBucketRateLimiter {
    async fn is_allowed(&self, route_id: &str, id: &str) -> RateLimitResponse {
        let config = self.config_for(route_id);
        let keys = BucketKeys::for_id(&format!("{}.{}", route_id, id));
        let request = BucketRequest::new(&config, self.clock.now());

        match self.store.acquire(&keys, &request).await {
            Ok(outcome) => {
                tracing::trace!(
                    route_id = %route_id,
                    allowed = outcome.allowed,
                    tokens_left = outcome.tokens_left,
                    "Rate limit check"
                );
                RateLimitResponse {
                    allowed: outcome.allowed,
                    tokens_remaining: outcome.tokens_left,
                    headers: self.headers.render(&config, outcome.tokens_left),
                }
            }
            Err(e) => {
                tracing::warn!(
                    route_id = %route_id,
                    error = %e,
                    "Rate limiter store failed, allowing request"
                );
                RateLimitResponse {
                    allowed: true,
                    tokens_remaining: -1,
                    headers: self.headers.render(&config, -1),
                }
            }
        }
    }
}
