//! Collapses repeated response header values.
//!
//! Typical use is a backend and the gateway both emitting CORS headers.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::config::ConfigError;
use crate::filter::{GatewayFilter, Next};
use crate::http::error::GatewayResult;
use crate::http::exchange::Exchange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DedupeStrategy {
    #[default]
    RetainFirst,
    RetainLast,
    /// Distinct values in order of first appearance.
    RetainUnique,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupeArgs {
    /// Space-separated header names.
    pub name: String,
    #[serde(default)]
    pub strategy: DedupeStrategy,
}

#[derive(Debug)]
pub struct DedupeResponseHeader {
    names: Vec<HeaderName>,
    strategy: DedupeStrategy,
}

impl DedupeResponseHeader {
    pub fn new(args: DedupeArgs) -> Result<Self, ConfigError> {
        let names = args
            .name
            .split_whitespace()
            .map(|n| {
                HeaderName::try_from(n)
                    .map_err(|e| ConfigError::invalid(format!("header name '{}'", n), e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            names,
            strategy: args.strategy,
        })
    }

    pub fn dedupe(&self, headers: &mut HeaderMap) {
        for name in &self.names {
            let values: Vec<HeaderValue> = headers.get_all(name).iter().cloned().collect();
            if values.len() <= 1 {
                continue;
            }

            let kept: Vec<HeaderValue> = match self.strategy {
                DedupeStrategy::RetainFirst => values.into_iter().take(1).collect(),
                DedupeStrategy::RetainLast => values.into_iter().last().into_iter().collect(),
                DedupeStrategy::RetainUnique => {
                    let mut unique: Vec<HeaderValue> = Vec::with_capacity(values.len());
                    for value in values {
                        if !unique.contains(&value) {
                            unique.push(value);
                        }
                    }
                    unique
                }
            };

            headers.remove(name);
            for value in kept {
                headers.append(name.clone(), value);
            }
        }
    }
}

#[async_trait]
impl GatewayFilter for DedupeResponseHeader {
    fn name(&self) -> &str {
        "DedupeResponseHeader"
    }

    async fn filter(&self, exchange: Exchange, next: Next<'_>) -> GatewayResult {
        let mut response = next.run(exchange).await?;
        self.dedupe(response.headers_mut());
        Ok(response)
    }
}
