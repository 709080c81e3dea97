//! Compiled routes.

use std::collections::BTreeMap;

use axum::http::Uri;

use crate::filter::FilterChain;
use crate::http::exchange::Exchange;
use crate::routing::matcher::Matcher;

/// A route built from configuration. Immutable once built.
#[derive(Debug)]
pub struct Route {
    pub id: String,
    /// Backend the request is forwarded to; only scheme and authority are used.
    pub uri: Uri,
    /// Precedence; lower is tried first.
    pub order: i32,
    pub matcher: Box<dyn Matcher>,
    /// Global filters and the route's own, already sorted.
    pub filters: FilterChain,
    pub metadata: BTreeMap<String, String>,
}

impl Route {
    pub fn matches(&self, exchange: &Exchange) -> bool {
        self.matcher.matches(exchange)
    }
}
