//! Filter chain assembly and execution.

use std::sync::Arc;

use crate::filter::{Dispatch, GatewayFilter, Next};
use crate::http::error::GatewayResult;
use crate::http::exchange::Exchange;

/// An ordered, immutable list of filters.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Arc<Vec<Arc<dyn GatewayFilter>>>,
}

impl FilterChain {
    /// Merge global and route filters and sort them by order.
    ///
    /// The sort is stable: global filters precede route filters of the same
    /// order and each list keeps its declaration order.
    pub fn assemble(
        global: impl IntoIterator<Item = Arc<dyn GatewayFilter>>,
        route: impl IntoIterator<Item = Arc<dyn GatewayFilter>>,
    ) -> Self {
        let mut filters: Vec<Arc<dyn GatewayFilter>> = global.into_iter().chain(route).collect();
        filters.sort_by_key(|f| f.order());
        Self {
            filters: Arc::new(filters),
        }
    }

    pub async fn execute(&self, exchange: Exchange, dispatcher: &dyn Dispatch) -> GatewayResult {
        Next::new(&self.filters, dispatcher).run(exchange).await
    }

    pub fn names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
