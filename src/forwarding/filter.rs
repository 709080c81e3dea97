//! Filters that emit `Forwarded` and `X-Forwarded-*` on the upstream request.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::http::{header, HeaderValue};

use crate::config::XForwardedConfig;
use crate::filter::{GatewayFilter, Next};
use crate::forwarding::forwarded::{parse_forwarded, Forwarded};
use crate::forwarding::trusted::TrustedProxies;
use crate::forwarding::x_forwarded::{self, write_header};
use crate::http::error::GatewayResult;
use crate::http::exchange::Exchange;

/// Header filters run after every route filter so that path rewrites are
/// visible to prefix inference.
pub const HEADERS_FILTER_ORDER: i32 = i32::MAX - 100;

/// Textual peer address as used for the trust check (no port, no brackets).
fn peer_ip(peer: &SocketAddr) -> String {
    peer.ip().to_string()
}

/// Node identifier for a `Forwarded` hop: `ip:port`, IPv6 bracketed.
fn node(addr: &SocketAddr) -> String {
    match addr {
        SocketAddr::V4(v4) => format!("{}:{}", v4.ip(), v4.port()),
        SocketAddr::V6(v6) => format!("[{}]:{}", v6.ip(), v6.port()),
    }
}

/// Whether the immediate peer may extend the forwarding headers.
///
/// An exchange without a known peer is treated as trusted and simply gets
/// no `for` value.
fn peer_trusted(trusted: &TrustedProxies, exchange: &Exchange) -> bool {
    exchange
        .attributes()
        .peer_addr
        .map(|peer| trusted.is_trusted(&peer_ip(&peer)))
        .unwrap_or(true)
}

/// Rewrites the RFC 7239 `Forwarded` header.
#[derive(Debug)]
pub struct ForwardedHeadersFilter {
    trusted: TrustedProxies,
    include_by: bool,
}

impl ForwardedHeadersFilter {
    pub fn new(trusted: TrustedProxies, include_by: bool) -> Self {
        Self {
            trusted,
            include_by,
        }
    }

    pub fn apply(&self, exchange: &mut Exchange) {
        let existing: Vec<Forwarded> = {
            let values = exchange
                .headers()
                .get_all(header::FORWARDED)
                .iter()
                .filter_map(|v| v.to_str().ok());
            parse_forwarded(values)
        };

        let mut hops: Vec<Forwarded> = existing
            .into_iter()
            .filter(|hop| hop.get("for").is_some_and(|f| self.trusted.is_trusted(f)))
            .collect();

        let attributes = exchange.attributes();
        if !peer_trusted(&self.trusted, exchange) {
            tracing::trace!(
                request_id = %attributes.request_id,
                peer = ?attributes.peer_addr,
                "Remote address not trusted, not adding Forwarded hop"
            );
        } else if let Some(host) = exchange.headers().get(header::HOST).and_then(|h| h.to_str().ok()) {
            let mut hop = Forwarded::new()
                .put("host", host)
                .put("proto", x_forwarded::scheme(&attributes.original_uri));
            if let Some(peer) = attributes.peer_addr {
                hop = hop.put("for", &node(&peer));
            }
            if self.include_by {
                if let Some(local) = attributes.local_addr {
                    hop = hop.put("by", &node(&local));
                }
            }
            hops.push(hop);
        }

        let headers = exchange.headers_mut();
        headers.remove(header::FORWARDED);
        for hop in hops {
            if let Ok(value) = HeaderValue::from_str(&hop.to_header_value()) {
                headers.append(header::FORWARDED, value);
            }
        }
    }
}

#[async_trait]
impl GatewayFilter for ForwardedHeadersFilter {
    fn name(&self) -> &str {
        "ForwardedHeaders"
    }

    fn order(&self) -> i32 {
        HEADERS_FILTER_ORDER
    }

    async fn filter(&self, mut exchange: Exchange, next: Next<'_>) -> GatewayResult {
        self.apply(&mut exchange);
        next.run(exchange).await
    }
}

/// Writes `X-Forwarded-For/Proto/Prefix/Port/Host`.
#[derive(Debug)]
pub struct XForwardedHeadersFilter {
    trusted: TrustedProxies,
    config: XForwardedConfig,
}

impl XForwardedHeadersFilter {
    pub fn new(trusted: TrustedProxies, config: XForwardedConfig) -> Self {
        Self { trusted, config }
    }

    pub fn apply(&self, exchange: &mut Exchange) {
        let config = &self.config;
        let trusted = |v: &str| self.trusted.is_trusted(v);

        if !peer_trusted(&self.trusted, exchange) {
            // Only strip what an untrusted client claimed about earlier hops.
            if config.for_header.enabled {
                write_header(exchange.headers_mut(), &x_forwarded::X_FORWARDED_FOR, None, true, trusted);
            }
            return;
        }

        let attributes = exchange.attributes();
        let original = attributes.original_uri.clone();
        let peer = attributes.peer_addr.map(|p| peer_ip(&p));
        let current_path = exchange.request().uri().path().to_string();
        let proto = x_forwarded::scheme(&original).to_string();
        let headers = exchange.headers_mut();

        if config.for_header.enabled {
            write_header(
                headers,
                &x_forwarded::X_FORWARDED_FOR,
                peer.as_deref(),
                config.for_header.append,
                trusted,
            );
        }

        if config.proto.enabled {
            write_header(
                headers,
                &x_forwarded::X_FORWARDED_PROTO,
                Some(&proto),
                config.proto.append,
                |_| true,
            );
        }

        if config.prefix.enabled {
            if let Some(prefix) = x_forwarded::infer_prefix(original.path(), &current_path) {
                write_header(
                    headers,
                    &x_forwarded::X_FORWARDED_PREFIX,
                    Some(&prefix),
                    config.prefix.append,
                    |_| true,
                );
            }
        }

        if config.port.enabled {
            let port = x_forwarded::port(&original).to_string();
            write_header(
                headers,
                &x_forwarded::X_FORWARDED_PORT,
                Some(&port),
                config.port.append,
                |_| true,
            );
        }

        if config.host.enabled {
            if let Some(host) = x_forwarded::host_header(&original) {
                write_header(
                    headers,
                    &x_forwarded::X_FORWARDED_HOST,
                    Some(&host),
                    config.host.append,
                    |_| true,
                );
            }
        }
    }
}

#[async_trait]
impl GatewayFilter for XForwardedHeadersFilter {
    fn name(&self) -> &str {
        "XForwardedHeaders"
    }

    fn order(&self) -> i32 {
        HEADERS_FILTER_ORDER
    }

    async fn filter(&self, mut exchange: Exchange, next: Next<'_>) -> GatewayResult {
        self.apply(&mut exchange);
        next.run(exchange).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderToggle;
    use axum::body::Body;
    use axum::http::Request;

    fn exchange(uri: &str, host: &str, peer: &str, headers: &[(&str, &str)]) -> Exchange {
        let mut builder = Request::builder().uri(uri).header("host", host);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).unwrap();
        Exchange::new(request, Some(peer.parse().unwrap()))
    }

    fn trusted(pattern: &str) -> TrustedProxies {
        TrustedProxies::from_pattern(pattern).unwrap()
    }

    fn header<'a>(exchange: &'a Exchange, name: &str) -> Vec<&'a str> {
        exchange
            .headers()
            .get_all(name)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect()
    }

    #[test]
    fn test_forwarded_hop_added_for_trusted_peer() {
        let filter = ForwardedHeadersFilter::new(trusted(r"10\.0\.0\..*"), false);
        let mut ex = exchange(
            "/get",
            "gateway.example",
            "10.0.0.1:5000",
            &[("forwarded", "for=10.0.0.9;proto=https")],
        );
        filter.apply(&mut ex);

        assert_eq!(
            header(&ex, "forwarded"),
            vec![
                "for=10.0.0.9;proto=https",
                "host=gateway.example;proto=http;for=\"10.0.0.1:5000\""
            ]
        );
    }

    #[test]
    fn test_forwarded_ipv6_peer_is_bracketed() {
        let filter = ForwardedHeadersFilter::new(trusted("::1"), false);
        let mut ex = exchange("/", "gw", "[::1]:4711", &[]);
        filter.apply(&mut ex);

        assert_eq!(header(&ex, "forwarded"), vec!["host=gw;proto=http;for=\"[::1]:4711\""]);
    }

    #[test]
    fn test_forwarded_untrusted_peer_adds_nothing() {
        let filter = ForwardedHeadersFilter::new(trusted(r"11\.0\.0\..*"), false);
        let mut ex = exchange(
            "/",
            "gw",
            "10.0.0.1:5000",
            &[("forwarded", "for=10.0.0.7, for=11.0.0.2")],
        );
        filter.apply(&mut ex);

        assert_eq!(header(&ex, "forwarded"), vec!["for=11.0.0.2"]);
    }

    #[test]
    fn test_forwarded_by_uses_local_address() {
        let filter = ForwardedHeadersFilter::new(trusted(".*"), true);
        let mut ex = exchange("/", "gw", "10.0.0.1:5000", &[])
            .with_local_addr("10.0.0.254:8080".parse().unwrap());
        filter.apply(&mut ex);

        assert_eq!(
            header(&ex, "forwarded"),
            vec!["host=gw;proto=http;for=\"10.0.0.1:5000\";by=\"10.0.0.254:8080\""]
        );
    }

    #[test]
    fn test_x_forwarded_for_appends_peer() {
        let filter = XForwardedHeadersFilter::new(
            trusted(r"127\.0\.0\.1|192\.168\..*"),
            XForwardedConfig::default(),
        );
        let mut ex = exchange(
            "/get",
            "localhost:8080",
            "127.0.0.1:40000",
            &[("x-forwarded-for", "192.168.0.2")],
        );
        filter.apply(&mut ex);

        assert_eq!(header(&ex, "x-forwarded-for"), vec!["192.168.0.2,127.0.0.1"]);
        assert_eq!(header(&ex, "x-forwarded-proto"), vec!["http"]);
        assert_eq!(header(&ex, "x-forwarded-port"), vec!["8080"]);
        assert_eq!(header(&ex, "x-forwarded-host"), vec!["localhost:8080"]);
        assert!(header(&ex, "x-forwarded-prefix").is_empty());
    }

    #[test]
    fn test_untrusted_peer_emits_no_x_forwarded_headers() {
        let filter = XForwardedHeadersFilter::new(trusted(r"11\.0\.0\..*"), XForwardedConfig::default());
        let mut ex = exchange(
            "/get",
            "gw",
            "10.0.0.1:5000",
            &[("x-forwarded-for", "10.0.0.7, 11.0.0.3")],
        );
        filter.apply(&mut ex);

        assert_eq!(header(&ex, "x-forwarded-for"), vec!["11.0.0.3"]);
        assert!(header(&ex, "x-forwarded-host").is_empty());
        assert!(header(&ex, "x-forwarded-port").is_empty());
        assert!(header(&ex, "x-forwarded-proto").is_empty());
    }

    #[test]
    fn test_prefix_inferred_after_rewrite() {
        let filter = XForwardedHeadersFilter::new(trusted(".*"), XForwardedConfig::default());
        let mut ex = exchange("/prefix/get/", "host:8080", "10.0.0.1:5000", &[]);
        ex.set_path("/get").unwrap();
        filter.apply(&mut ex);

        assert_eq!(header(&ex, "x-forwarded-prefix"), vec!["/prefix"]);
    }

    #[test]
    fn test_overwrite_mode_replaces_values() {
        let config = XForwardedConfig {
            for_header: HeaderToggle {
                enabled: true,
                append: false,
            },
            host: HeaderToggle {
                enabled: false,
                append: false,
            },
            ..XForwardedConfig::default()
        };
        let filter = XForwardedHeadersFilter::new(trusted(".*"), config);
        let mut ex = exchange(
            "/",
            "gw",
            "10.0.0.1:5000",
            &[("x-forwarded-for", "1.2.3.4"), ("x-forwarded-host", "client")],
        );
        filter.apply(&mut ex);

        assert_eq!(header(&ex, "x-forwarded-for"), vec!["10.0.0.1"]);
        assert_eq!(header(&ex, "x-forwarded-host"), vec!["client"]);
    }
}
