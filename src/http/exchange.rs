//! The per-request exchange passed through the filter chain.
//!
//! An [`Exchange`] owns the inbound request (rewritten in place by filters)
//! and a set of attributes that filters share with each other and with the
//! dispatcher: the matched route, the original URI, the peer address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::uri::{PathAndQuery, Uri};
use axum::http::{request, Request};

use crate::http::error::GatewayError;
use crate::routing::route::Route;

/// Header carrying the correlation id, set by the request-id layer.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Headers that describe a single transport hop and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Request-scoped state shared between filters.
#[derive(Debug, Clone)]
pub struct ExchangeAttributes {
    /// Correlation id (`x-request-id`).
    pub request_id: String,

    /// Address of the immediate peer, when the listener knows it.
    pub peer_addr: Option<SocketAddr>,

    /// Address the gateway accepted the connection on.
    pub local_addr: Option<SocketAddr>,

    /// The inbound URI as the client addressed it, recorded before any
    /// path rewriting.
    pub original_uri: Uri,

    /// Route selected by the route table.
    pub route: Option<Arc<Route>>,

    /// Keep the inbound `Host` header on the upstream request.
    pub preserve_host: bool,

    /// Weight group → selected route id, drawn once per request.
    pub weights: HashMap<String, String>,
}

/// An inbound request travelling through the gateway.
#[derive(Debug)]
pub struct Exchange {
    request: Request<Body>,
    attributes: ExchangeAttributes,
}

impl Exchange {
    /// Wrap an inbound request, recording its original URI.
    pub fn new(request: Request<Body>, peer_addr: Option<SocketAddr>) -> Self {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let original_uri = absolute_uri(&request);

        Self {
            request,
            attributes: ExchangeAttributes {
                request_id,
                peer_addr,
                local_addr: None,
                original_uri,
                route: None,
                preserve_host: false,
                weights: HashMap::new(),
            },
        }
    }

    pub fn with_local_addr(mut self, local_addr: SocketAddr) -> Self {
        self.attributes.local_addr = Some(local_addr);
        self
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.request.headers_mut()
    }

    pub fn attributes(&self) -> &ExchangeAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut ExchangeAttributes {
        &mut self.attributes
    }

    pub fn route(&self) -> Option<&Arc<Route>> {
        self.attributes.route.as_ref()
    }

    pub fn set_route(&mut self, route: Arc<Route>) {
        self.attributes.route = Some(route);
    }

    pub fn into_parts(self) -> (request::Parts, Body, ExchangeAttributes) {
        let (parts, body) = self.request.into_parts();
        (parts, body, self.attributes)
    }

    pub fn from_parts(parts: request::Parts, body: Body, attributes: ExchangeAttributes) -> Self {
        Self {
            request: Request::from_parts(parts, body),
            attributes,
        }
    }

    /// Replace the request path, keeping the query string.
    pub fn set_path(&mut self, path: &str) -> Result<(), GatewayError> {
        let uri = self.request.uri();
        let path_and_query = match uri.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path.to_string(),
        };

        let mut parts = uri.clone().into_parts();
        parts.path_and_query = Some(
            PathAndQuery::try_from(path_and_query.as_str())
                .map_err(|e| GatewayError::Internal(format!("invalid rewritten path: {}", e)))?,
        );
        *self.request.uri_mut() = Uri::from_parts(parts)
            .map_err(|e| GatewayError::Internal(format!("invalid rewritten uri: {}", e)))?;
        Ok(())
    }

    /// Build the request sent to the backend.
    ///
    /// The target is the route URI's scheme and authority joined with the
    /// current path and query. Hop-by-hop headers are removed and `Host` is
    /// left for the client to set unless the route preserves it.
    pub fn into_upstream_request(self) -> Result<Request<Body>, GatewayError> {
        let route = self.attributes.route.clone().ok_or(GatewayError::NoRoute)?;
        let (mut parts, body) = self.request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        let mut target = route.uri.clone().into_parts();
        target.path_and_query = Some(path_and_query);
        parts.uri = Uri::from_parts(target)
            .map_err(|e| GatewayError::Internal(format!("invalid upstream uri: {}", e)))?;

        strip_hop_by_hop(&mut parts.headers);
        if !self.attributes.preserve_host {
            parts.headers.remove(header::HOST);
        }

        Ok(Request::from_parts(parts, body))
    }
}

/// Copy method, URI, version and headers of a request head.
///
/// Extensions are not carried over; the exchange attributes hold everything
/// the chain needs.
pub fn clone_head(parts: &request::Parts) -> request::Parts {
    let (mut head, ()) = Request::new(()).into_parts();
    head.method = parts.method.clone();
    head.uri = parts.uri.clone();
    head.version = parts.version;
    head.headers = parts.headers.clone();
    head
}

pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Reconstruct the absolute URI the client used, from the `Host` header.
fn absolute_uri(request: &Request<Body>) -> Uri {
    let uri = request.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return uri.clone();
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok());
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    host.and_then(|host| format!("http://{}{}", host, path).parse().ok())
        .unwrap_or_else(|| uri.clone())
}
