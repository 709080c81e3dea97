//! Request and response header filters.

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use serde::Deserialize;

use crate::config::ConfigError;
use crate::filter::{GatewayFilter, Next};
use crate::http::error::GatewayResult;
use crate::http::exchange::Exchange;

/// `{ name, value }` arguments shared by the add/set filters.
#[derive(Debug, Clone, Deserialize)]
pub struct NameValueArgs {
    pub name: String,
    pub value: String,
}

/// `{ name }` arguments shared by the remove filters.
#[derive(Debug, Clone, Deserialize)]
pub struct NameArgs {
    pub name: String,
}

fn header_name(name: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::try_from(name).map_err(|e| ConfigError::invalid(format!("header name '{}'", name), e.to_string()))
}

fn header_value(value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::try_from(value)
        .map_err(|e| ConfigError::invalid(format!("header value '{}'", value), e.to_string()))
}

/// Which side of the exchange a header filter edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Append,
    Set,
    Remove,
}

/// Adds, sets or removes one header on the request or response.
#[derive(Debug)]
pub struct HeaderFilter {
    name: &'static str,
    side: Side,
    action: Action,
    header: HeaderName,
    value: Option<HeaderValue>,
}

impl HeaderFilter {
    pub fn add(side: Side, args: NameValueArgs) -> Result<Self, ConfigError> {
        let name = match side {
            Side::Request => "AddRequestHeader",
            Side::Response => "AddResponseHeader",
        };
        Ok(Self {
            name,
            side,
            action: Action::Append,
            header: header_name(&args.name)?,
            value: Some(header_value(&args.value)?),
        })
    }

    pub fn set(side: Side, args: NameValueArgs) -> Result<Self, ConfigError> {
        let name = match side {
            Side::Request => "SetRequestHeader",
            Side::Response => "SetResponseHeader",
        };
        Ok(Self {
            name,
            side,
            action: Action::Set,
            header: header_name(&args.name)?,
            value: Some(header_value(&args.value)?),
        })
    }

    pub fn remove(side: Side, args: NameArgs) -> Result<Self, ConfigError> {
        let name = match side {
            Side::Request => "RemoveRequestHeader",
            Side::Response => "RemoveResponseHeader",
        };
        Ok(Self {
            name,
            side,
            action: Action::Remove,
            header: header_name(&args.name)?,
            value: None,
        })
    }

    fn apply(&self, headers: &mut axum::http::HeaderMap) {
        match (self.action, &self.value) {
            (Action::Append, Some(value)) => {
                headers.append(self.header.clone(), value.clone());
            }
            (Action::Set, Some(value)) => {
                headers.insert(self.header.clone(), value.clone());
            }
            _ => {
                headers.remove(&self.header);
            }
        }
    }
}

#[async_trait]
impl GatewayFilter for HeaderFilter {
    fn name(&self) -> &str {
        self.name
    }

    async fn filter(&self, mut exchange: Exchange, next: Next<'_>) -> GatewayResult {
        if self.side == Side::Request {
            self.apply(exchange.headers_mut());
            return next.run(exchange).await;
        }

        let mut response = next.run(exchange).await?;
        self.apply(response.headers_mut());
        Ok(response)
    }
}

/// Sends the client's `Host` header to the backend instead of the route's.
#[derive(Debug, Default)]
pub struct PreserveHostHeader;

#[async_trait]
impl GatewayFilter for PreserveHostHeader {
    fn name(&self) -> &str {
        "PreserveHostHeader"
    }

    async fn filter(&self, mut exchange: Exchange, next: Next<'_>) -> GatewayResult {
        exchange.attributes_mut().preserve_host = true;
        next.run(exchange).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::{exchange, StubDispatch};
    use crate::filter::FilterChain;
    use std::sync::Arc;

    fn args(name: &str, value: &str) -> NameValueArgs {
        NameValueArgs {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_request_headers_added_set_and_removed() {
        let chain = FilterChain::assemble(
            Vec::new(),
            vec![
                Arc::new(HeaderFilter::add(Side::Request, args("X-Tag", "a")).unwrap())
                    as Arc<dyn GatewayFilter>,
                Arc::new(HeaderFilter::add(Side::Request, args("X-Tag", "b")).unwrap()),
                Arc::new(HeaderFilter::set(Side::Request, args("X-Mode", "gateway")).unwrap()),
                Arc::new(
                    HeaderFilter::remove(
                        Side::Request,
                        NameArgs {
                            name: "Cookie".to_string(),
                        },
                    )
                    .unwrap(),
                ),
            ],
        );
        let backend = StubDispatch::status(200, "ok");

        let mut ex = exchange("/");
        ex.headers_mut().insert("x-mode", HeaderValue::from_static("client"));
        ex.headers_mut().insert("cookie", HeaderValue::from_static("s=1"));
        chain.execute(ex, &backend).await.unwrap();

        let seen = &backend.seen()[0];
        let tags: Vec<_> = seen.headers.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["a", "b"]);
        assert_eq!(seen.headers["x-mode"], "gateway");
        assert!(seen.headers.get("cookie").is_none());
    }

    #[tokio::test]
    async fn test_response_header_added() {
        let chain = FilterChain::assemble(
            Vec::new(),
            vec![Arc::new(HeaderFilter::add(Side::Response, args("X-Served-By", "gw")).unwrap())
                as Arc<dyn GatewayFilter>],
        );
        let backend = StubDispatch::status(200, "ok");

        let res = chain.execute(exchange("/"), &backend).await.unwrap();
        assert_eq!(res.headers()["x-served-by"], "gw");
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        assert!(HeaderFilter::add(Side::Request, args("bad header", "x")).is_err());
        assert!(HeaderFilter::add(Side::Request, args("X-Ok", "line\nbreak")).is_err());
    }
}
