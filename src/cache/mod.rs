//! Response cache.
//!
//! # Data Flow
//! ```text
//! LocalResponseCache filter
//!     → directives.rs (request gate: GET/HEAD, no body, no no-store/private)
//!     → key.rs (metadata key → stored Vary list → response key)
//!     → store.rs
//!         → hit:  manager.rs serves the entry, max-age = remaining TTL
//!         → miss: rest of the chain, then the body is captured as it
//!                 streams to the client and stored when complete
//! ```
//!
//! # Design Decisions
//! - Store failures are misses; the cache never fails a request
//! - Bodies are stored decoded so the size bound counts real bytes
//! - `Vary: *` is remembered per resource so later lookups bypass the cache
//! - Each route with the filter gets its own store; a route refresh starts cold

pub mod directives;
pub mod entry;
pub mod filter;
pub mod key;
pub mod manager;
pub mod store;

pub use entry::{CachedMetadata, CachedResponse};
pub use filter::{LocalResponseCacheArgs, LocalResponseCacheFilter};
pub use key::RequestSnapshot;
pub use manager::{CacheLookup, ResponseCacheManager};
pub use store::{CacheStore, InMemoryCacheStore};
