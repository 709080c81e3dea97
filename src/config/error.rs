//! Configuration error types.
//!
//! Every error here is raised while loading or building routes, never while
//! serving a request.

use std::fmt;

/// A single semantic problem found by [`validate_config`](super::validation::validate_config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Error type for configuration loading and route building.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("invalid {subject}: {reason}")]
    Invalid { subject: String, reason: String },

    #[error("unknown {kind} '{name}'")]
    Unknown { kind: &'static str, name: String },

    #[error("invalid arguments for {name}: {source}")]
    Args {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("route '{route}': {source}")]
    Route {
        route: String,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    pub fn invalid(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn in_route(self, route: &str) -> Self {
        ConfigError::Route {
            route: route.to_string(),
            source: Box::new(self),
        }
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
