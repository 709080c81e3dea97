//! The `RequestRateLimiter` filter.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use serde::Deserialize;

use crate::filter::{GatewayFilter, Next};
use crate::http::error::GatewayResult;
use crate::http::exchange::Exchange;
use crate::observability::metrics;
use crate::ratelimit::config::RefillStyle;
use crate::ratelimit::key::KeyResolver;
use crate::ratelimit::limiter::RateLimiter;

/// Filter arguments; unset values fall back to `[rate_limiter]` settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RateLimiterArgs {
    pub replenish_rate: Option<u32>,
    pub burst_capacity: Option<u32>,
    pub requested_tokens: Option<u32>,
    pub refill: RefillStyle,
    /// `remote_addr` or `header:<Name>`.
    pub key_resolver: Option<String>,
    pub deny_empty_key: Option<bool>,
    pub empty_key_status: Option<u16>,
    pub status_code: Option<u16>,
}

#[derive(Debug)]
pub struct RequestRateLimiterFilter {
    route_id: String,
    limiter: Arc<dyn RateLimiter>,
    key_resolver: Arc<dyn KeyResolver>,
    deny_empty_key: bool,
    empty_key_status: StatusCode,
    denied_status: StatusCode,
}

impl RequestRateLimiterFilter {
    pub fn new(
        route_id: impl Into<String>,
        limiter: Arc<dyn RateLimiter>,
        key_resolver: Arc<dyn KeyResolver>,
    ) -> Self {
        Self {
            route_id: route_id.into(),
            limiter,
            key_resolver,
            deny_empty_key: true,
            empty_key_status: StatusCode::FORBIDDEN,
            denied_status: StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn deny_empty_key(mut self, deny: bool, status: StatusCode) -> Self {
        self.deny_empty_key = deny;
        self.empty_key_status = status;
        self
    }

    pub fn denied_status(mut self, status: StatusCode) -> Self {
        self.denied_status = status;
        self
    }
}

fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn add_headers(target: &mut HeaderMap, headers: &std::collections::BTreeMap<String, String>) {
    for (name, value) in headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                target.insert(name, value);
            }
            _ => tracing::debug!(header = %name, "Skipping invalid rate limit header"),
        }
    }
}

#[async_trait]
impl GatewayFilter for RequestRateLimiterFilter {
    fn name(&self) -> &str {
        "RequestRateLimiter"
    }

    async fn filter(&self, exchange: Exchange, next: Next<'_>) -> GatewayResult {
        let key = self
            .key_resolver
            .resolve(&exchange)
            .filter(|k| !k.is_empty());

        let Some(key) = key else {
            if self.deny_empty_key {
                tracing::debug!(
                    request_id = %exchange.attributes().request_id,
                    route_id = %self.route_id,
                    "Rate limit key is empty, denying request"
                );
                return Ok(status_response(self.empty_key_status));
            }
            return next.run(exchange).await;
        };

        let decision = self.limiter.is_allowed(&self.route_id, &key).await;
        if !decision.allowed {
            tracing::info!(
                request_id = %exchange.attributes().request_id,
                route_id = %self.route_id,
                key = %key,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(&self.route_id);
            let mut response = status_response(self.denied_status);
            add_headers(response.headers_mut(), &decision.headers);
            return Ok(response);
        }

        let mut response = next.run(exchange).await?;
        add_headers(response.headers_mut(), &decision.headers);
        Ok(response)
    }
}
