//! Metrics collection.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, rate limiting, cache, retries)
//! - Record through the `metrics` facade; installing an exporter is left to
//!   the embedding application
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rate_limited_total` (counter): denied requests by route
//! - `gateway_cache_lookups_total` (counter): cache lookups by route, outcome
//! - `gateway_retries_total` (counter): granted retries by route
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for route and status code
//! - Without a recorder installed every call is a no-op

use std::time::Instant;

pub fn record_request(route_id: &str, method: &str, status: u16, start: Instant) {
    let labels = [
        ("route", route_id.to_string()),
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("gateway_requests_total", &labels[..]).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", &labels[..])
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(route_id: &str) {
    metrics::counter!("gateway_rate_limited_total", "route" => route_id.to_string()).increment(1);
}

pub fn record_cache_lookup(route_id: &str, outcome: &'static str) {
    metrics::counter!(
        "gateway_cache_lookups_total",
        "route" => route_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_retry(route_id: &str) {
    metrics::counter!("gateway_retries_total", "route" => route_id.to_string()).increment(1);
}
