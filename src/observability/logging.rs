//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Pick the output format (pretty or JSON) from configuration
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - JSON format for production, human-readable format for development
//! - Initialization is idempotent: a second call leaves the first subscriber
//!   in place

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(config: &ObservabilityConfig) -> String {
    format!("route_gateway={level},tower_http={level}", level = config.log_level)
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_use_configured_level() {
        let config = ObservabilityConfig {
            log_level: "debug".to_string(),
            json_logs: true,
        };
        assert_eq!(default_directives(&config), "route_gateway=debug,tower_http=debug");
    }

    #[test]
    fn test_second_init_is_harmless() {
        let config = ObservabilityConfig::default();
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
