//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, burst >= replenish rate)
//! - Reject duplicate route ids and unsupported target schemes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Predicate and filter names are checked later by the registries, which
//!   own the set of known names

use std::collections::HashSet;

use url::Url;

use crate::config::error::ValidationError;
use crate::config::schema::GatewayConfig;

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.connect_secs", timeouts.connect_secs),
        ("timeouts.response_secs", timeouts.response_secs),
        ("timeouts.request_secs", timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if let Some(pattern) = &config.forwarded.trusted_proxies {
        if pattern.trim().is_empty() {
            errors.push(ValidationError::new(
                "forwarded.trusted_proxies",
                "must not be empty; omit it to disable forwarded headers",
            ));
        } else if let Err(e) = regex::Regex::new(pattern) {
            errors.push(ValidationError::new("forwarded.trusted_proxies", e.to_string()));
        }
    }

    let limiter = &config.rate_limiter;
    if limiter.replenish_rate == 0 {
        errors.push(ValidationError::new(
            "rate_limiter.replenish_rate",
            "must be greater than 0",
        ));
    }
    if limiter.burst_capacity < limiter.replenish_rate {
        errors.push(ValidationError::new(
            "rate_limiter.burst_capacity",
            format!(
                "{} is lower than replenish_rate {}",
                limiter.burst_capacity, limiter.replenish_rate
            ),
        ));
    }
    if limiter.requested_tokens == 0 {
        errors.push(ValidationError::new(
            "rate_limiter.requested_tokens",
            "must be greater than 0",
        ));
    }

    if config.cache.time_to_live_secs == 0 {
        errors.push(ValidationError::new("cache.time_to_live_secs", "must be greater than 0"));
    }
    if config.cache.size_bytes == 0 {
        errors.push(ValidationError::new("cache.size_bytes", "must be greater than 0"));
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must be set when admin is enabled"));
    }

    let mut seen = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if route.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("routes[{}].id", i), "must not be empty"));
        } else if !seen.insert(route.id.as_str()) {
            errors.push(ValidationError::new(
                format!("routes[{}].id", i),
                format!("duplicate route id '{}'", route.id),
            ));
        }

        match Url::parse(&route.uri) {
            Ok(url) if url.scheme() == "http" && url.host().is_some() => {}
            Ok(url) => errors.push(ValidationError::new(
                format!("routes[{}].uri", i),
                format!("unsupported target '{}' (scheme {})", route.uri, url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                format!("routes[{}].uri", i),
                format!("'{}': {}", route.uri, e),
            )),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
