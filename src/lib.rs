//! Route Gateway Library
//!
//! An API gateway: requests are matched against configured routes, run
//! through the route's filter chain, and forwarded to the route's backend.

// Core subsystems
pub mod config;
pub mod filter;
pub mod http;
pub mod routing;

// Filters with their own state
pub mod cache;
pub mod forwarding;
pub mod ratelimit;
pub mod resilience;

// Cross-cutting concerns
pub mod admin;
pub mod clock;
pub mod lifecycle;
pub mod observability;
pub mod store;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
