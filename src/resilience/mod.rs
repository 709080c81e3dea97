//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Retry filter:
//!     → buffer the request body (cache_body)
//!     → run the rest of the chain
//!     → retries.rs (is the outcome retryable? is there an attempt left?)
//!         → no:  surface the outcome unchanged
//!         → yes: drop the response, backoff.rs (delay), run again
//! ```
//!
//! # Design Decisions
//! - Connect and request timeouts live in the HTTP client; every attempt
//!   gets its own deadline
//! - Each attempt re-runs the filters after Retry, so per-hop headers are
//!   rebuilt for every attempt
//! - Jittered backoff prevents thundering herd

pub mod backoff;
pub mod filter;
pub mod retries;

pub use backoff::BackoffConfig;
pub use filter::RetryFilter;
pub use retries::{RetryConfig, RetryPolicy, RetryState, StatusSeries};
