//! Retry policy.
//!
//! # Responsibilities
//! - Decide whether an attempt's outcome warrants another attempt
//! - Bound the number of attempts issued for one request
//!
//! # Design Decisions
//! - Dispatch failures listed in `exceptions` are retried for any method;
//!   status-based retries only apply to the listed methods
//! - `max_attempts` counts every attempt, the first one included

use std::collections::HashSet;

use axum::http::{Method, StatusCode};
use serde::Deserialize;

use crate::config::ConfigError;
use crate::http::client::DispatchErrorKind;
use crate::http::error::{GatewayError, GatewayResult};
use crate::resilience::backoff::BackoffConfig;

/// Status code classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusSeries {
    Informational,
    Successful,
    Redirection,
    ClientError,
    ServerError,
}

impl StatusSeries {
    pub fn of(status: StatusCode) -> Option<Self> {
        match status.as_u16() / 100 {
            1 => Some(StatusSeries::Informational),
            2 => Some(StatusSeries::Successful),
            3 => Some(StatusSeries::Redirection),
            4 => Some(StatusSeries::ClientError),
            5 => Some(StatusSeries::ServerError),
            _ => None,
        }
    }
}

/// Arguments of the `Retry` filter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(alias = "retries")]
    pub max_attempts: u32,
    pub statuses: Vec<u16>,
    pub series: Vec<StatusSeries>,
    pub methods: Vec<String>,
    pub exceptions: Vec<DispatchErrorKind>,
    /// Buffer the request body so every attempt sends it.
    pub cache_body: bool,
    pub backoff: Option<BackoffConfig>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            statuses: Vec::new(),
            series: vec![StatusSeries::ServerError],
            methods: vec!["GET".to_string()],
            exceptions: vec![DispatchErrorKind::Connect, DispatchErrorKind::Io],
            cache_body: false,
            backoff: None,
        }
    }
}

/// A validated [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    statuses: HashSet<StatusCode>,
    series: HashSet<StatusSeries>,
    methods: HashSet<Method>,
    exceptions: HashSet<DispatchErrorKind>,
    cache_body: bool,
    backoff: Option<BackoffConfig>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Result<Self, ConfigError> {
        if config.max_attempts == 0 {
            return Err(ConfigError::invalid("retry", "max_attempts must be greater than 0"));
        }
        if config.methods.is_empty() {
            return Err(ConfigError::invalid("retry", "methods may not be empty"));
        }
        if config.statuses.is_empty() && config.series.is_empty() {
            return Err(ConfigError::invalid(
                "retry",
                "statuses and series may not both be empty",
            ));
        }
        if let Some(backoff) = &config.backoff {
            backoff.validate()?;
        }

        let statuses = config
            .statuses
            .iter()
            .map(|code| {
                StatusCode::from_u16(*code)
                    .map_err(|_| ConfigError::invalid("retry", format!("invalid status code {}", code)))
            })
            .collect::<Result<_, _>>()?;
        let methods = config
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|_| ConfigError::invalid("retry", format!("invalid method '{}'", m)))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            max_attempts: config.max_attempts,
            statuses,
            series: config.series.into_iter().collect(),
            methods,
            exceptions: config.exceptions.into_iter().collect(),
            cache_body: config.cache_body,
            backoff: config.backoff,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn cache_body(&self) -> bool {
        self.cache_body
    }

    fn retryable_status(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status)
            || StatusSeries::of(status).is_some_and(|s| self.series.contains(&s))
    }

    /// Whether `outcome` of a `method` request is worth another attempt.
    pub fn is_retryable(&self, method: &Method, outcome: &GatewayResult) -> bool {
        match outcome {
            Ok(response) => self.methods.contains(method) && self.retryable_status(response.status()),
            Err(GatewayError::Dispatch(e)) => self.exceptions.contains(&e.kind),
            Err(_) => false,
        }
    }

    /// Delay before retry number `attempt`, if a backoff is configured.
    pub fn backoff(&self, attempt: u32) -> Option<std::time::Duration> {
        self.backoff.as_ref().map(|b| b.delay(attempt))
    }
}

/// Retries granted so far for one request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
}

impl RetryState {
    /// Record a retry if another attempt fits within the policy's bound.
    pub fn grant(&mut self, policy: &RetryPolicy) -> bool {
        if self.attempts + 1 >= policy.max_attempts {
            return false;
        }
        self.attempts += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::response;
    use crate::http::client::DispatchError;

    fn policy(config: RetryConfig) -> RetryPolicy {
        RetryPolicy::new(config).unwrap()
    }

    fn dispatch_error(kind: DispatchErrorKind) -> GatewayResult {
        Err(GatewayError::Dispatch(DispatchError::new(kind, "http://b", "failed")))
    }

    #[test]
    fn test_defaults_retry_server_errors_for_get() {
        let p = policy(RetryConfig::default());
        assert!(p.is_retryable(&Method::GET, &Ok(response(503, ""))));
        assert!(!p.is_retryable(&Method::GET, &Ok(response(404, ""))));
        assert!(!p.is_retryable(&Method::POST, &Ok(response(503, ""))));
    }

    #[test]
    fn test_exceptions_ignore_method() {
        let p = policy(RetryConfig::default());
        assert!(p.is_retryable(&Method::POST, &dispatch_error(DispatchErrorKind::Connect)));
        assert!(p.is_retryable(&Method::GET, &dispatch_error(DispatchErrorKind::Io)));
        assert!(!p.is_retryable(&Method::GET, &dispatch_error(DispatchErrorKind::Timeout)));
        assert!(!p.is_retryable(&Method::GET, &Err(GatewayError::NoRoute)));
    }

    #[test]
    fn test_explicit_statuses() {
        let p = policy(RetryConfig {
            statuses: vec![429],
            series: Vec::new(),
            methods: vec!["get".into(), "POST".into()],
            ..RetryConfig::default()
        });
        assert!(p.is_retryable(&Method::POST, &Ok(response(429, ""))));
        assert!(!p.is_retryable(&Method::GET, &Ok(response(500, ""))));
    }

    #[test]
    fn test_state_bounds_total_attempts() {
        let p = policy(RetryConfig::default());
        let mut state = RetryState::default();
        assert!(state.grant(&p));
        assert!(state.grant(&p));
        assert!(!state.grant(&p));
        assert_eq!(state.attempts, 2);

        let single = policy(RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        });
        assert!(!RetryState::default().grant(&single));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let zero = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert!(RetryPolicy::new(zero).is_err());

        let no_methods = RetryConfig {
            methods: Vec::new(),
            ..RetryConfig::default()
        };
        assert!(RetryPolicy::new(no_methods).is_err());

        let nothing_to_retry = RetryConfig {
            statuses: Vec::new(),
            series: Vec::new(),
            ..RetryConfig::default()
        };
        assert!(RetryPolicy::new(nothing_to_retry).is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: RetryConfig = serde_json::from_value(serde_json::json!({
            "retries": 4,
            "series": ["SERVER_ERROR", "CLIENT_ERROR"],
            "exceptions": ["connect", "timeout"],
            "cache_body": true,
            "backoff": {"first_backoff_ms": 10}
        }))
        .unwrap();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.series.len(), 2);
        assert!(config.exceptions.contains(&DispatchErrorKind::Timeout));
        assert_eq!(config.backoff.unwrap().max_backoff_ms, 500);
    }
}
