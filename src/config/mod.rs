//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → routing::RouteBuilder compiles the route table
//!
//! On reload signal:
//!     watcher.rs detects change (or POST /admin/refresh)
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → routes rebuilt, then atomically swapped into the table
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A config that fails to build keeps the previous routes in service

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use error::{ConfigError, ValidationError};
pub use loader::{load_config, parse_config};
pub use watcher::ConfigWatcher;
pub use schema::{
    AdminConfig, CacheSettings, FilterDefinition, ForwardedConfig, GatewayConfig, HeaderToggle,
    ListenerConfig, ObservabilityConfig, PredicateDefinition, RateLimiterSettings, RouteConfig,
    TimeoutConfig, XForwardedConfig,
};
