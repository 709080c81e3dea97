//! Filter factories by name.
//!
//! Every filter a route may declare is resolved here, at route build time.
//! Unknown names and malformed arguments fail the build; nothing is looked
//! up while serving a request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{Map, Value};

use crate::cache::{InMemoryCacheStore, LocalResponseCacheArgs, LocalResponseCacheFilter, ResponseCacheManager};
use crate::clock::Clock;
use crate::config::{ConfigError, FilterDefinition, GatewayConfig};
use crate::filter::dedupe::{DedupeArgs, DedupeResponseHeader};
use crate::filter::headers::{HeaderFilter, NameArgs, NameValueArgs, PreserveHostHeader, Side};
use crate::filter::path::{PrefixPath, RewritePath, RewritePathArgs, StripPrefix};
use crate::filter::{GatewayFilter, OrderedFilter};
use crate::ratelimit::key::parse_key_resolver;
use crate::ratelimit::{RateLimiterArgs, RateLimiterConfig, RequestRateLimiterFilter, TokenBucketRateLimiter};
use crate::resilience::{RetryConfig, RetryFilter, RetryPolicy};
use crate::routing::registry::parse_args;

/// Everything a filter factory may need besides its own arguments.
pub struct BuildContext<'a> {
    pub route_id: &'a str,
    pub config: &'a GatewayConfig,
    pub rate_limiter: Arc<TokenBucketRateLimiter>,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("route_id", &self.route_id)
            .finish_non_exhaustive()
    }
}

pub type FilterFactory = fn(&Map<String, Value>, &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError>;

/// Maps filter names (`StripPrefix`, `Retry`, …) to factories.
#[derive(Clone)]
pub struct FilterRegistry {
    factories: HashMap<&'static str, FilterFactory>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl FilterRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, factory: FilterFactory) {
        self.factories.insert(name, factory);
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Build one filter; an explicit `order` wraps it in [`OrderedFilter`].
    pub fn build(
        &self,
        definition: &FilterDefinition,
        context: &BuildContext<'_>,
    ) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
        let factory = self
            .factories
            .get(definition.name.as_str())
            .ok_or_else(|| ConfigError::Unknown {
                kind: "filter",
                name: definition.name.clone(),
            })?;

        let filter = factory(&definition.args, context)?;
        Ok(match definition.order {
            Some(order) => Arc::new(OrderedFilter::new(order, filter)),
            None => filter,
        })
    }

    pub fn build_all(
        &self,
        definitions: &[FilterDefinition],
        context: &BuildContext<'_>,
    ) -> Result<Vec<Arc<dyn GatewayFilter>>, ConfigError> {
        definitions.iter().map(|d| self.build(d, context)).collect()
    }
}

fn add_request_header(args: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let args: NameValueArgs = parse_args("AddRequestHeader", args)?;
    Ok(Arc::new(HeaderFilter::add(Side::Request, args)?))
}

fn add_response_header(args: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let args: NameValueArgs = parse_args("AddResponseHeader", args)?;
    Ok(Arc::new(HeaderFilter::add(Side::Response, args)?))
}

fn set_request_header(args: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let args: NameValueArgs = parse_args("SetRequestHeader", args)?;
    Ok(Arc::new(HeaderFilter::set(Side::Request, args)?))
}

fn set_response_header(args: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let args: NameValueArgs = parse_args("SetResponseHeader", args)?;
    Ok(Arc::new(HeaderFilter::set(Side::Response, args)?))
}

fn remove_request_header(args: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let args: NameArgs = parse_args("RemoveRequestHeader", args)?;
    Ok(Arc::new(HeaderFilter::remove(Side::Request, args)?))
}

fn remove_response_header(args: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let args: NameArgs = parse_args("RemoveResponseHeader", args)?;
    Ok(Arc::new(HeaderFilter::remove(Side::Response, args)?))
}

fn preserve_host_header(_: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    Ok(Arc::new(PreserveHostHeader))
}

fn strip_prefix(args: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let filter: StripPrefix = parse_args("StripPrefix", args)?;
    Ok(Arc::new(filter))
}

fn prefix_path(args: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let filter: PrefixPath = parse_args("PrefixPath", args)?;
    if !filter.prefix.starts_with('/') {
        return Err(ConfigError::invalid("PrefixPath", "prefix must start with '/'"));
    }
    Ok(Arc::new(filter))
}

fn rewrite_path(args: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let args: RewritePathArgs = parse_args("RewritePath", args)?;
    Ok(Arc::new(RewritePath::new(args)?))
}

fn dedupe_response_header(args: &Map<String, Value>, _: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let args: DedupeArgs = parse_args("DedupeResponseHeader", args)?;
    Ok(Arc::new(DedupeResponseHeader::new(args)?))
}

fn status(code: u16, what: &str) -> Result<StatusCode, ConfigError> {
    StatusCode::from_u16(code).map_err(|_| ConfigError::invalid(what, format!("invalid status code {}", code)))
}

fn request_rate_limiter(args: &Map<String, Value>, context: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let args: RateLimiterArgs = parse_args("RequestRateLimiter", args)?;
    let defaults = &context.config.rate_limiter;

    let config = RateLimiterConfig::new(
        args.replenish_rate.unwrap_or(defaults.replenish_rate),
        args.burst_capacity.unwrap_or(defaults.burst_capacity),
    )?
    .with_requested_tokens(args.requested_tokens.unwrap_or(defaults.requested_tokens))?
    .with_refill(args.refill);
    context.rate_limiter.configure(context.route_id, config);

    let resolver = parse_key_resolver(args.key_resolver.as_deref().unwrap_or("remote_addr"))?;
    let filter = RequestRateLimiterFilter::new(context.route_id, context.rate_limiter.clone(), resolver)
        .deny_empty_key(
            args.deny_empty_key.unwrap_or(defaults.deny_empty_key),
            status(
                args.empty_key_status.unwrap_or(defaults.empty_key_status),
                "RequestRateLimiter",
            )?,
        )
        .denied_status(status(
            args.status_code.unwrap_or(StatusCode::TOO_MANY_REQUESTS.as_u16()),
            "RequestRateLimiter",
        )?);
    Ok(Arc::new(filter))
}

fn local_response_cache(args: &Map<String, Value>, context: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let args: LocalResponseCacheArgs = parse_args("LocalResponseCache", args)?;
    let defaults = &context.config.cache;
    let ttl = Duration::from_secs(args.time_to_live_secs.unwrap_or(defaults.time_to_live_secs));
    let size = args.size_bytes.unwrap_or(defaults.size_bytes);
    if ttl.is_zero() || size == 0 {
        return Err(ConfigError::invalid(
            "LocalResponseCache",
            "time_to_live_secs and size_bytes must be greater than 0",
        ));
    }

    let store = InMemoryCacheStore::new(context.clock.clone(), ttl, size);
    let manager = ResponseCacheManager::new(Arc::new(store), context.clock.clone(), ttl, size);
    Ok(Arc::new(LocalResponseCacheFilter::new(context.route_id, Arc::new(manager))))
}

fn retry(args: &Map<String, Value>, context: &BuildContext<'_>) -> Result<Arc<dyn GatewayFilter>, ConfigError> {
    let config: RetryConfig = parse_args("Retry", args)?;
    Ok(Arc::new(RetryFilter::new(context.route_id, RetryPolicy::new(config)?)))
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("AddRequestHeader", add_request_header);
        registry.register("AddResponseHeader", add_response_header);
        registry.register("SetRequestHeader", set_request_header);
        registry.register("SetResponseHeader", set_response_header);
        registry.register("RemoveRequestHeader", remove_request_header);
        registry.register("RemoveResponseHeader", remove_response_header);
        registry.register("PreserveHostHeader", preserve_host_header);
        registry.register("StripPrefix", strip_prefix);
        registry.register("PrefixPath", prefix_path);
        registry.register("RewritePath", rewrite_path);
        registry.register("DedupeResponseHeader", dedupe_response_header);
        registry.register("RequestRateLimiter", request_rate_limiter);
        registry.register("LocalResponseCache", local_response_cache);
        registry.register("Retry", retry);
        registry
    }
}
