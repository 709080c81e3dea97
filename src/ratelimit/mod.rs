//! Rate limiting subsystem.
//!
//! # Data Flow
//! ```text
//! RequestRateLimiter filter
//!     → key.rs (resolve identity: peer address, header)
//!     → limiter.rs (pick the route's config, build keys)
//!     → store.rs (atomic refill + debit)
//!         → bucket.rs (token bucket arithmetic)
//!     → allowed: continue chain, add diagnostic headers
//!     → denied:  429 with diagnostic headers
//! ```
//!
//! # Design Decisions
//! - One atomic store operation per check; no read-then-write from filters
//! - Fails open: a store error allows the request and reports remaining -1
//! - Invalid configurations (burst below rate) fail at route build time
//! - Bucket state carries its own TTL so idle identities are forgotten

pub mod bucket;
pub mod config;
pub mod filter;
pub mod key;
pub mod limiter;
pub mod store;

pub use config::{RateLimiterConfig, RefillStyle};
pub use filter::{RateLimiterArgs, RequestRateLimiterFilter};
pub use key::KeyResolver;
pub use limiter::{RateLimitHeaders, RateLimitResponse, RateLimiter, TokenBucketRateLimiter};
pub use store::{InMemoryRateLimitStore, RateLimitStore};
