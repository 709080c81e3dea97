//! The `LocalResponseCache` filter.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::cache::directives::has_directive;
use crate::cache::key::RequestSnapshot;
use crate::cache::manager::{CacheLookup, ResponseCacheManager};
use crate::filter::{GatewayFilter, Next};
use crate::http::error::GatewayResult;
use crate::http::exchange::Exchange;
use crate::observability::metrics;

/// Filter arguments; unset values fall back to `[cache]` settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocalResponseCacheArgs {
    pub time_to_live_secs: Option<u64>,
    pub size_bytes: Option<u64>,
}

#[derive(Debug)]
pub struct LocalResponseCacheFilter {
    route_id: String,
    manager: Arc<ResponseCacheManager>,
}

impl LocalResponseCacheFilter {
    pub fn new(route_id: impl Into<String>, manager: Arc<ResponseCacheManager>) -> Self {
        Self {
            route_id: route_id.into(),
            manager,
        }
    }
}

#[async_trait]
impl GatewayFilter for LocalResponseCacheFilter {
    fn name(&self) -> &str {
        "LocalResponseCache"
    }

    async fn filter(&self, exchange: Exchange, next: Next<'_>) -> GatewayResult {
        let snapshot = RequestSnapshot::from_exchange(&exchange);
        let lookup = self.manager.lookup(&snapshot).await;
        metrics::record_cache_lookup(&self.route_id, lookup.outcome());
        tracing::debug!(
            request_id = %exchange.attributes().request_id,
            route_id = %self.route_id,
            outcome = lookup.outcome(),
            "Cache lookup"
        );

        match lookup {
            CacheLookup::Hit(cached) => {
                let revalidate = has_directive(&snapshot.headers, "no-cache");
                Ok(self.manager.serve(&cached, revalidate))
            }
            CacheLookup::Uncacheable => next.run(exchange).await,
            CacheLookup::Miss => {
                let response = next.run(exchange).await?;
                Ok(self.manager.capture(snapshot, response).await)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::InMemoryCacheStore;
    use crate::clock::ManualClock;
    use crate::filter::test_support::{body_string, exchange, response, StubDispatch};
    use crate::filter::FilterChain;
    use axum::http::{HeaderValue, Method, StatusCode};
    use std::time::Duration;

    fn chain(clock: &ManualClock) -> FilterChain {
        let ttl = Duration::from_secs(30);
        let store = InMemoryCacheStore::new(Arc::new(clock.clone()), ttl, 1 << 20);
        let manager = ResponseCacheManager::new(Arc::new(store), Arc::new(clock.clone()), ttl, 1 << 20);
        let filter = LocalResponseCacheFilter::new("cached", Arc::new(manager));
        FilterChain::assemble(Vec::new(), vec![Arc::new(filter) as Arc<dyn GatewayFilter>])
    }

    #[tokio::test]
    async fn test_second_request_served_from_cache() {
        let clock = ManualClock::default();
        let chain = chain(&clock);
        let backend = StubDispatch::new(|call| Ok(response(200, if call == 0 { "first" } else { "second" })));

        let first = chain.execute(exchange("/items"), &backend).await.unwrap();
        assert_eq!(first.headers()["cache-control"], "max-age=30");
        assert_eq!(body_string(first).await, "first");

        clock.advance(Duration::from_secs(5));
        let second = chain.execute(exchange("/items"), &backend).await.unwrap();
        assert_eq!(second.headers()["cache-control"], "max-age=25");
        assert_eq!(body_string(second).await, "first");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_cache_request_on_hit_returns_304() {
        let clock = ManualClock::default();
        let chain = chain(&clock);
        let backend = StubDispatch::status(200, "body");
        body_string(chain.execute(exchange("/items"), &backend).await.unwrap()).await;

        let mut ex = exchange("/items");
        ex.headers_mut()
            .insert("cache-control", HeaderValue::from_static("no-cache"));
        let res = chain.execute(ex, &backend).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(body_string(res).await, "");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_store_request_bypasses_cache() {
        let clock = ManualClock::default();
        let chain = chain(&clock);
        let backend = StubDispatch::status(200, "body");

        for _ in 0..2 {
            let mut ex = exchange("/items");
            ex.headers_mut()
                .insert("cache-control", HeaderValue::from_static("no-store"));
            let res = chain.execute(ex, &backend).await.unwrap();
            assert!(res.headers().get("cache-control").is_none());
            body_string(res).await;
        }
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_post_not_cached() {
        let clock = ManualClock::default();
        let chain = chain(&clock);
        let backend = StubDispatch::status(200, "created");

        for _ in 0..2 {
            let mut ex = exchange("/items");
            *ex.request_mut().method_mut() = Method::POST;
            body_string(chain.execute(ex, &backend).await.unwrap()).await;
        }
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_error_status_not_cached() {
        let clock = ManualClock::default();
        let chain = chain(&clock);
        let backend = StubDispatch::status(500, "boom");

        for _ in 0..2 {
            body_string(chain.execute(exchange("/items"), &backend).await.unwrap()).await;
        }
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_authorization_separates_entries() {
        let clock = ManualClock::default();
        let chain = chain(&clock);
        let backend = StubDispatch::status(200, "body");

        body_string(chain.execute(exchange("/me"), &backend).await.unwrap()).await;
        let mut ex = exchange("/me");
        ex.headers_mut()
            .insert("authorization", HeaderValue::from_static("Bearer abc"));
        body_string(chain.execute(ex, &backend).await.unwrap()).await;
        assert_eq!(backend.calls(), 2);
    }
}
