//! Filter subsystem.
//!
//! # Data Flow
//! ```text
//! FilterChain [f1 (order -1), f2 (order 0), f3 (order 0)]
//!
//!     f1.pre → f2.pre → f3.pre → Dispatch (backend I/O)
//!                                    │
//!     f1.post ← f2.post ← f3.post ←──┘
//! ```
//!
//! # Design Decisions
//! - Each filter receives `Next`, the rest of the chain including dispatch;
//!   not calling it short-circuits (cache hit, rate limit denial)
//! - `Next` is `Copy`, so a filter may run the remainder more than once (retry)
//! - Chains are assembled once per route at build time and shared via `Arc`
//! - Filters hold no request-scoped state

pub mod chain;
pub mod dedupe;
pub mod headers;
pub mod path;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::http::error::GatewayResult;
use crate::http::exchange::Exchange;

pub use chain::FilterChain;
pub use registry::{BuildContext, FilterRegistry};

/// A unit of request/response transformation.
#[async_trait]
pub trait GatewayFilter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Position in the chain; lower runs first. Equal orders keep declaration order.
    fn order(&self) -> i32 {
        0
    }

    async fn filter(&self, exchange: Exchange, next: Next<'_>) -> GatewayResult;
}

/// The innermost step of a chain.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, exchange: Exchange) -> GatewayResult;
}

/// The remainder of a filter chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    filters: &'a [Arc<dyn GatewayFilter>],
    dispatcher: &'a dyn Dispatch,
}

impl<'a> Next<'a> {
    pub(crate) fn new(filters: &'a [Arc<dyn GatewayFilter>], dispatcher: &'a dyn Dispatch) -> Self {
        Self {
            filters,
            dispatcher,
        }
    }

    /// Run the rest of the chain, ending with the dispatch.
    pub async fn run(self, exchange: Exchange) -> GatewayResult {
        match self.filters.split_first() {
            Some((head, rest)) => head.filter(exchange, Next::new(rest, self.dispatcher)).await,
            None => self.dispatcher.dispatch(exchange).await,
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.filters.len())
            .finish()
    }
}

/// Overrides the order of the wrapped filter.
#[derive(Debug)]
pub struct OrderedFilter {
    order: i32,
    inner: Arc<dyn GatewayFilter>,
}

impl OrderedFilter {
    pub fn new(order: i32, inner: Arc<dyn GatewayFilter>) -> Self {
        Self { order, inner }
    }
}

#[async_trait]
impl GatewayFilter for OrderedFilter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn filter(&self, exchange: Exchange, next: Next<'_>) -> GatewayResult {
        self.inner.filter(exchange, next).await
    }
}
