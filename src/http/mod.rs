//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, timeout)
//!     → handler.rs (build the Exchange, look up the route)
//!     → [route filter chain]
//!     → dispatch.rs → client.rs (send upstream)
//!     → Response streamed back, or error.rs renders a JSON error
//! ```

pub mod client;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod server;

pub use client::{DispatchError, DispatchErrorKind, HttpClient, HyperClient};
pub use dispatch::Dispatcher;
pub use error::{GatewayError, GatewayResult};
pub use exchange::{Exchange, ExchangeAttributes, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
