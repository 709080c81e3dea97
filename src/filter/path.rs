//! Path rewriting filters.
//!
//! These run before the forwarding header filters, so the original URI kept
//! in the exchange attributes is what `X-Forwarded-Prefix` is inferred from.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::filter::{GatewayFilter, Next};
use crate::http::error::GatewayResult;
use crate::http::exchange::Exchange;

/// Removes the first `parts` path segments.
#[derive(Debug, Clone, Deserialize)]
pub struct StripPrefix {
    #[serde(default = "default_parts")]
    pub parts: usize,
}

fn default_parts() -> usize {
    1
}

impl StripPrefix {
    pub fn strip(&self, path: &str) -> String {
        let rest: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .skip(self.parts)
            .collect();

        let mut stripped = format!("/{}", rest.join("/"));
        if path.ends_with('/') && stripped.len() > 1 {
            stripped.push('/');
        }
        stripped
    }
}

#[async_trait]
impl GatewayFilter for StripPrefix {
    fn name(&self) -> &str {
        "StripPrefix"
    }

    async fn filter(&self, mut exchange: Exchange, next: Next<'_>) -> GatewayResult {
        let path = self.strip(exchange.request().uri().path());
        exchange.set_path(&path)?;
        next.run(exchange).await
    }
}

/// Prepends a fixed prefix to the path.
#[derive(Debug, Clone, Deserialize)]
pub struct PrefixPath {
    pub prefix: String,
}

#[async_trait]
impl GatewayFilter for PrefixPath {
    fn name(&self) -> &str {
        "PrefixPath"
    }

    async fn filter(&self, mut exchange: Exchange, next: Next<'_>) -> GatewayResult {
        let path = format!(
            "{}{}",
            self.prefix.trim_end_matches('/'),
            exchange.request().uri().path()
        );
        exchange.set_path(&path)?;
        next.run(exchange).await
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewritePathArgs {
    pub regexp: String,
    pub replacement: String,
}

/// Regex replacement over the path; `$name`/`${name}` refer to captures.
#[derive(Debug)]
pub struct RewritePath {
    pattern: Regex,
    replacement: String,
}

impl RewritePath {
    pub fn new(args: RewritePathArgs) -> Result<Self, ConfigError> {
        let pattern = Regex::new(&args.regexp)
            .map_err(|e| ConfigError::invalid(format!("RewritePath regexp '{}'", args.regexp), e.to_string()))?;
        Ok(Self {
            pattern,
            replacement: args.replacement,
        })
    }

    pub fn rewrite(&self, path: &str) -> String {
        let rewritten = self.pattern.replace_all(path, self.replacement.as_str());
        if rewritten.starts_with('/') {
            rewritten.into_owned()
        } else {
            format!("/{}", rewritten)
        }
    }
}

#[async_trait]
impl GatewayFilter for RewritePath {
    fn name(&self) -> &str {
        "RewritePath"
    }

    async fn filter(&self, mut exchange: Exchange, next: Next<'_>) -> GatewayResult {
        let path = self.rewrite(exchange.request().uri().path());
        exchange.set_path(&path)?;
        next.run(exchange).await
    }
}
