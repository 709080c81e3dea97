//! Identity extraction for rate limiting.

use std::fmt;
use std::sync::Arc;

use axum::http::HeaderName;

use crate::config::ConfigError;
use crate::http::exchange::Exchange;

/// Resolves the identity a request is limited under.
///
/// `None` (or an empty string) means no identity could be determined.
pub trait KeyResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, exchange: &Exchange) -> Option<String>;
}

/// Limits by the peer IP address.
#[derive(Debug, Default)]
pub struct RemoteAddrKeyResolver;

impl KeyResolver for RemoteAddrKeyResolver {
    fn resolve(&self, exchange: &Exchange) -> Option<String> {
        exchange.attributes().peer_addr.map(|addr| addr.ip().to_string())
    }
}

/// Limits by the value of a request header (e.g. an API key).
#[derive(Debug)]
pub struct HeaderKeyResolver {
    name: HeaderName,
}

impl HeaderKeyResolver {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

impl KeyResolver for HeaderKeyResolver {
    fn resolve(&self, exchange: &Exchange) -> Option<String> {
        exchange
            .headers()
            .get(&self.name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Build a resolver from `remote_addr` or `header:<Name>`.
pub fn parse_key_resolver(text: &str) -> Result<Arc<dyn KeyResolver>, ConfigError> {
    match text.split_once(':') {
        None if text == "remote_addr" => Ok(Arc::new(RemoteAddrKeyResolver)),
        Some(("header", name)) => {
            let name = HeaderName::try_from(name.trim())
                .map_err(|e| ConfigError::invalid(format!("key resolver '{}'", text), e.to_string()))?;
            Ok(Arc::new(HeaderKeyResolver::new(name)))
        }
        _ => Err(ConfigError::Unknown {
            kind: "key resolver",
            name: text.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::exchange;
    use axum::http::HeaderValue;

    #[test]
    fn test_remote_addr_resolver() {
        let resolver = parse_key_resolver("remote_addr").unwrap();
        assert_eq!(resolver.resolve(&exchange("/")).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_header_resolver() {
        let resolver = parse_key_resolver("header:X-Api-Key").unwrap();
        let mut ex = exchange("/");
        assert_eq!(resolver.resolve(&ex), None);

        ex.headers_mut().insert("x-api-key", HeaderValue::from_static("  "));
        assert_eq!(resolver.resolve(&ex), None);

        ex.headers_mut().insert("x-api-key", HeaderValue::from_static("k-1"));
        assert_eq!(resolver.resolve(&ex).as_deref(), Some("k-1"));
    }

    #[test]
    fn test_unknown_resolver() {
        assert!(matches!(
            parse_key_resolver("principal"),
            Err(ConfigError::Unknown { .. })
        ));
        assert!(parse_key_resolver("header:bad name").is_err());
    }
}
