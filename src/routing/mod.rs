//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (host, path, headers, peer)
//!     → router.rs (draw weight groups, scan routes in order)
//!     → matcher.rs (evaluate the route's predicate tree)
//!     → Return: matched Route or None
//!
//! Route compilation (startup and every refresh):
//!     RouteConfig[]
//!     → builder.rs (registries turn definitions into matchers and filters)
//!     → Sort by order
//!     → Publish as an immutable RouteSet
//! ```
//!
//! # Design Decisions
//! - Routes compiled ahead of time, immutable at runtime
//! - Path and header patterns compiled to anchored regexes once
//! - First match wins (ordered by `order`, then declaration)

pub mod builder;
pub mod matcher;
pub mod registry;
pub mod route;
pub mod router;
pub mod weight;

pub use builder::RouteBuilder;
pub use matcher::Matcher;
pub use registry::{PredicateContext, PredicateFactory, PredicateRegistry};
pub use route::Route;
pub use router::{RouteSet, RouteTable};
pub use weight::WeightGroups;
