//! Route compilation.
//!
//! # Data Flow
//! ```text
//! GatewayConfig
//!     → forwarding::build_filters + default_filters   (global filters)
//!     → per route:
//!         uri        → parsed target (http only)
//!         predicates → PredicateRegistry → one Matcher (AND)
//!         filters    → FilterRegistry    → FilterChain (global + own, sorted)
//!     → RouteSet (sorted by order, weight groups attached)
//! ```
//!
//! # Design Decisions
//! - A build either yields a complete route set or an error naming the route;
//!   callers keep the previous set on error
//! - Rate limiter buckets live in a store shared across builds, so a refresh
//!   does not hand every client a full bucket

use std::sync::Arc;

use axum::http::Uri;

use crate::clock::Clock;
use crate::config::{ConfigError, GatewayConfig, RouteConfig};
use crate::filter::registry::{BuildContext, FilterRegistry};
use crate::filter::{FilterChain, GatewayFilter};
use crate::forwarding;
use crate::ratelimit::{RateLimitHeaders, RateLimitStore, RateLimiterConfig, TokenBucketRateLimiter};
use crate::routing::registry::{PredicateContext, PredicateRegistry};
use crate::routing::route::Route;
use crate::routing::router::RouteSet;
use crate::routing::weight::WeightGroups;

/// Compiles configuration into a [`RouteSet`].
#[derive(Debug, Clone)]
pub struct RouteBuilder {
    predicates: PredicateRegistry,
    filters: FilterRegistry,
    rate_limit_store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RouteBuilder {
    pub fn new(rate_limit_store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            predicates: PredicateRegistry::default(),
            filters: FilterRegistry::default(),
            rate_limit_store,
            clock,
        }
    }

    /// Replace the registries, e.g. to add custom filters.
    pub fn with_registries(mut self, predicates: PredicateRegistry, filters: FilterRegistry) -> Self {
        self.predicates = predicates;
        self.filters = filters;
        self
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.names()
    }

    pub fn predicate_names(&self) -> Vec<&'static str> {
        self.predicates.names()
    }

    pub fn build(&self, config: &GatewayConfig) -> Result<RouteSet, ConfigError> {
        let settings = &config.rate_limiter;
        let rate_limiter = Arc::new(TokenBucketRateLimiter::new(
            self.rate_limit_store.clone(),
            self.clock.clone(),
            RateLimiterConfig::new(settings.replenish_rate, settings.burst_capacity)?
                .with_requested_tokens(settings.requested_tokens)?,
            RateLimitHeaders::from(settings),
        ));

        let forwarding = forwarding::build_filters(&config.forwarded)?;
        let mut weights = WeightGroups::new();
        let mut routes = Vec::with_capacity(config.routes.len());

        for rc in &config.routes {
            let context = BuildContext {
                route_id: &rc.id,
                config,
                rate_limiter: rate_limiter.clone(),
                clock: self.clock.clone(),
            };
            let route = self
                .build_route(rc, &forwarding, &context, &mut weights)
                .map_err(|e| e.in_route(&rc.id))?;
            routes.push(Arc::new(route));
        }

        tracing::debug!(routes = routes.len(), "Routes compiled");
        Ok(RouteSet::new(routes, weights))
    }

    fn build_route(
        &self,
        rc: &RouteConfig,
        forwarding: &[Arc<dyn GatewayFilter>],
        context: &BuildContext<'_>,
        weights: &mut WeightGroups,
    ) -> Result<Route, ConfigError> {
        let uri = parse_target(&rc.uri)?;

        let mut predicate_context = PredicateContext {
            route_id: &rc.id,
            weights,
        };
        let matcher = self.predicates.build_all(&rc.predicates, &mut predicate_context)?;

        // Default filters are built per route so stateful ones (caches,
        // limiters) are keyed to the route that uses them.
        let mut global = forwarding.to_vec();
        global.extend(self.filters.build_all(&context.config.default_filters, context)?);
        let own = self.filters.build_all(&rc.filters, context)?;

        Ok(Route {
            id: rc.id.clone(),
            uri,
            order: rc.order,
            matcher,
            filters: FilterChain::assemble(global, own),
            metadata: rc.metadata.clone(),
        })
    }
}

fn parse_target(raw: &str) -> Result<Uri, ConfigError> {
    let uri: Uri = raw
        .parse()
        .map_err(|e| ConfigError::invalid("uri", format!("'{}': {}", raw, e)))?;
    match (uri.scheme_str(), uri.authority()) {
        (Some("http"), Some(_)) => Ok(uri),
        _ => Err(ConfigError::invalid(
            "uri",
            format!("'{}' must be an absolute http:// target", raw),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::InMemoryRateLimitStore;

    fn builder() -> RouteBuilder {
        RouteBuilder::new(Arc::new(InMemoryRateLimitStore::new()), Arc::new(ManualClock::default()))
    }

    fn config(toml_str: &str) -> GatewayConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_builds_routes_in_order() {
        let set = builder()
            .build(&config(
                r#"
                [[routes]]
                id = "late"
                uri = "http://a:1"
                order = 10

                [[routes]]
                id = "early"
                uri = "http://b:2"
                order = -1

                [[routes.predicates]]
                name = "Path"
                args = { pattern = "/api/**" }

                [[routes.filters]]
                name = "StripPrefix"
                args = { parts = 1 }
                "#,
            ))
            .unwrap();

        let ids: Vec<_> = set.routes().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["early", "late"]);

        assert_eq!(set.routes()[0].filters.names(), ["StripPrefix"]);
        assert!(set.routes()[1].filters.is_empty());
    }

    #[test]
    fn test_default_filters_apply_to_every_route() {
        let set = builder()
            .build(&config(
                r#"
                [[default_filters]]
                name = "AddResponseHeader"
                args = { name = "X-Gateway", value = "1" }

                [[routes]]
                id = "a"
                uri = "http://a:1"

                [[routes]]
                id = "b"
                uri = "http://b:1"
                "#,
            ))
            .unwrap();

        for route in set.routes() {
            assert_eq!(route.filters.names(), ["AddResponseHeader"]);
        }
    }

    #[test]
    fn test_trusted_proxies_add_forwarding_filters() {
        let set = builder()
            .build(&config(
                r#"
                [forwarded]
                trusted_proxies = "127\\.0\\.0\\.1"

                [[routes]]
                id = "a"
                uri = "http://a:1"

                [[routes.filters]]
                name = "PrefixPath"
                args = { prefix = "/v1" }
                "#,
            ))
            .unwrap();
        assert_eq!(
            set.routes()[0].filters.names(),
            ["PrefixPath", "ForwardedHeaders", "XForwardedHeaders"]
        );
    }

    #[test]
    fn test_error_names_route() {
        let err = builder()
            .build(&config(
                r#"
                [[routes]]
                id = "broken"
                uri = "http://a:1"

                [[routes.filters]]
                name = "Teleport"
                "#,
            ))
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert!(err.to_string().contains("Teleport"));
    }

    #[test]
    fn test_non_http_target_rejected() {
        assert!(parse_target("https://secure:443").is_err());
        assert!(parse_target("/relative").is_err());
        assert!(parse_target("http://ok:8080").is_ok());
    }

    #[test]
    fn test_weight_groups_collected() {
        let set = builder()
            .build(&config(
                r#"
                [[routes]]
                id = "blue"
                uri = "http://blue:1"
                [[routes.predicates]]
                name = "Weight"
                args = { group = "deploy", weight = 1 }

                [[routes]]
                id = "green"
                uri = "http://green:1"
                [[routes.predicates]]
                name = "Weight"
                args = { group = "deploy", weight = 0 }
                "#,
            ))
            .unwrap();
        assert_eq!(set.len(), 2);
    }
}
