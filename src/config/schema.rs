//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Forwarded / X-Forwarded-* header rewriting.
    pub forwarded: ForwardedConfig,

    /// Defaults for the `RequestRateLimiter` filter.
    pub rate_limiter: RateLimiterSettings,

    /// Defaults for the `LocalResponseCache` filter.
    pub cache: CacheSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Filters applied to every route, ahead of the route's own filters.
    pub default_filters: Vec<FilterDefinition>,

    /// Route definitions, matched in ascending `order`.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Backend response timeout in seconds (per attempt).
    pub response_secs: u64,

    /// Total time the gateway may spend on one inbound request, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            response_secs: 30,
            request_secs: 60,
        }
    }
}

/// A route: predicates select requests, filters transform them, `uri` receives them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Unique route identifier.
    pub id: String,

    /// Target URI; only scheme and authority are used.
    pub uri: String,

    /// Route precedence (lower = checked first).
    #[serde(default)]
    pub order: i32,

    /// Predicates, combined with AND semantics.
    #[serde(default)]
    pub predicates: Vec<PredicateDefinition>,

    /// Filters in declaration order.
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,

    /// Free-form route metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A named predicate and its arguments.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredicateDefinition {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// A named filter, its arguments and an optional explicit order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterDefinition {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub order: Option<i32>,
}

/// Forwarded header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardedConfig {
    /// Regex matched against peer addresses. Unset disables header rewriting.
    pub trusted_proxies: Option<String>,

    /// Emit the RFC 7239 `Forwarded` header.
    pub forwarded_enabled: bool,

    /// Add `by=<gateway address>` to the emitted hop.
    pub by_enabled: bool,

    /// Legacy `X-Forwarded-*` headers.
    pub x_forwarded: XForwardedConfig,
}

impl Default for ForwardedConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: None,
            forwarded_enabled: true,
            by_enabled: false,
            x_forwarded: XForwardedConfig::default(),
        }
    }
}

/// Enable/append switches for one `X-Forwarded-*` header.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeaderToggle {
    pub enabled: bool,
    pub append: bool,
}

impl Default for HeaderToggle {
    fn default() -> Self {
        Self {
            enabled: true,
            append: true,
        }
    }
}

/// `X-Forwarded-*` configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct XForwardedConfig {
    pub enabled: bool,
    #[serde(rename = "for")]
    pub for_header: HeaderToggle,
    pub host: HeaderToggle,
    pub port: HeaderToggle,
    pub proto: HeaderToggle,
    pub prefix: HeaderToggle,
}

impl Default for XForwardedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            for_header: HeaderToggle::default(),
            host: HeaderToggle::default(),
            port: HeaderToggle::default(),
            proto: HeaderToggle::default(),
            prefix: HeaderToggle::default(),
        }
    }
}

/// Rate limiter defaults and diagnostic header names.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimiterSettings {
    /// Tokens added per second.
    pub replenish_rate: u32,

    /// Bucket capacity.
    pub burst_capacity: u32,

    /// Tokens consumed per request.
    pub requested_tokens: u32,

    /// Emit the diagnostic headers.
    pub include_headers: bool,

    pub remaining_header: String,
    pub replenish_rate_header: String,
    pub burst_capacity_header: String,
    pub requested_tokens_header: String,

    /// Reject requests whose key cannot be resolved.
    pub deny_empty_key: bool,

    /// Status returned when the key is empty and `deny_empty_key` is set.
    pub empty_key_status: u16,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            replenish_rate: 10,
            burst_capacity: 20,
            requested_tokens: 1,
            include_headers: true,
            remaining_header: "X-RateLimit-Remaining".to_string(),
            replenish_rate_header: "X-RateLimit-Replenish-Rate".to_string(),
            burst_capacity_header: "X-RateLimit-Burst-Capacity".to_string(),
            requested_tokens_header: "X-RateLimit-Requested-Tokens".to_string(),
            deny_empty_key: true,
            empty_key_status: 403,
        }
    }
}

/// Response cache defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Entry lifetime in seconds.
    pub time_to_live_secs: u64,

    /// Per-route store bound in bytes (also the largest storable entry).
    pub size_bytes: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            time_to_live_secs: 300,
            size_bytes: 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
