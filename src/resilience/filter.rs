//! The `Retry` filter.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header;
use bytes::Bytes;

use crate::filter::{GatewayFilter, Next};
use crate::http::error::{GatewayError, GatewayResult};
use crate::http::exchange::{clone_head, Exchange};
use crate::observability::metrics;
use crate::resilience::retries::{RetryPolicy, RetryState};

/// Largest request body buffered for replay.
pub const MAX_REPLAY_BODY: usize = 1024 * 1024;

#[derive(Debug)]
pub struct RetryFilter {
    route_id: String,
    policy: Arc<RetryPolicy>,
}

impl RetryFilter {
    pub fn new(route_id: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            route_id: route_id.into(),
            policy: Arc::new(policy),
        }
    }
}

fn has_body(headers: &axum::http::HeaderMap) -> bool {
    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    length.is_some_and(|l| l > 0) || headers.contains_key(header::TRANSFER_ENCODING)
}

async fn buffer_body(headers: &axum::http::HeaderMap, body: Body) -> Result<Bytes, GatewayError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());
    if declared.is_some_and(|l| l > MAX_REPLAY_BODY) {
        return Err(GatewayError::PayloadTooLarge {
            limit: MAX_REPLAY_BODY,
        });
    }
    axum::body::to_bytes(body, MAX_REPLAY_BODY)
        .await
        .map_err(|e| GatewayError::Body(e.to_string()))
}

#[async_trait]
impl GatewayFilter for RetryFilter {
    fn name(&self) -> &str {
        "Retry"
    }

    async fn filter(&self, exchange: Exchange, next: Next<'_>) -> GatewayResult {
        let (parts, body, attributes) = exchange.into_parts();
        let carries_body = has_body(&parts.headers);

        let (replay, mut first_body) = if self.policy.cache_body() {
            (Some(buffer_body(&parts.headers, body).await?), None)
        } else {
            (None, Some(body))
        };

        let mut state = RetryState::default();
        loop {
            let body = match (&replay, first_body.take()) {
                (Some(bytes), _) => Body::from(bytes.clone()),
                (None, Some(body)) => body,
                (None, None) => Body::empty(),
            };
            let attempt = Exchange::from_parts(clone_head(&parts), body, attributes.clone());
            let outcome = next.run(attempt).await;

            if !self.policy.is_retryable(&parts.method, &outcome) {
                return outcome;
            }
            // The streamed body is gone; a reissue would declare bytes it cannot send.
            if carries_body && replay.is_none() {
                tracing::warn!(
                    request_id = %attributes.request_id,
                    route_id = %self.route_id,
                    "Not retrying request with a consumed body; enable cache_body to replay it"
                );
                return outcome;
            }
            if !state.grant(&self.policy) {
                return outcome;
            }

            let reason = match &outcome {
                Ok(response) => response.status().to_string(),
                Err(e) => e.to_string(),
            };
            // Releases the upstream connection before the next attempt.
            drop(outcome);

            metrics::record_retry(&self.route_id);
            tracing::info!(
                request_id = %attributes.request_id,
                route_id = %self.route_id,
                attempt = state.attempts + 1,
                max_attempts = self.policy.max_attempts(),
                reason = %reason,
                "Retrying request"
            );
            if let Some(delay) = self.policy.backoff(state.attempts) {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
