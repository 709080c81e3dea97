//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a request
//! - Swap in a new route set on refresh
//!
//! # Design Decisions
//! - A route set is immutable; refresh replaces it wholesale through `ArcSwap`
//! - Requests in flight keep the set they started with
//! - O(n) scan in `order` (acceptable for typical route counts)
//! - Explicit `None` rather than a silent default route

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::http::exchange::Exchange;
use crate::routing::route::Route;
use crate::routing::weight::WeightGroups;

/// Routes sorted by order, plus their weight groups.
#[derive(Debug, Default)]
pub struct RouteSet {
    routes: Vec<Arc<Route>>,
    weights: WeightGroups,
}

impl RouteSet {
    /// Sort routes by `order`; equal orders keep configuration order.
    pub fn new(mut routes: Vec<Arc<Route>>, weights: WeightGroups) -> Self {
        routes.sort_by_key(|r| r.order);
        Self { routes, weights }
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The live route table.
#[derive(Debug)]
pub struct RouteTable {
    current: ArcSwap<RouteSet>,
}

impl RouteTable {
    pub fn new(set: RouteSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(set),
        }
    }

    /// Atomically replace the route set.
    pub fn replace(&self, set: RouteSet) {
        tracing::info!(routes = set.len(), "Route table replaced");
        self.current.store(Arc::new(set));
    }

    pub fn snapshot(&self) -> Arc<RouteSet> {
        self.current.load_full()
    }

    /// Find the first route matching the exchange.
    ///
    /// Weight groups are drawn here, once per request, and recorded on the
    /// exchange before any predicate runs.
    pub fn lookup(&self, exchange: &mut Exchange) -> Option<Arc<Route>> {
        let set = self.current.load();
        if !set.weights.is_empty() {
            exchange.attributes_mut().weights = set.weights.draw();
        }
        set.routes.iter().find(|route| route.matches(exchange)).cloned()
    }
}
