//! Upstream HTTP client.
//!
//! # Responsibilities
//! - Abstract the transport behind [`HttpClient`] so the chain can be driven
//!   without sockets in tests
//! - Enforce connect and response timeouts
//! - Classify failures into [`DispatchErrorKind`] for the retry policy
//!
//! # Design Decisions
//! - hyper-util legacy client with a plain `HttpConnector` (pooled, HTTP/1.1)
//! - Response bodies stream through untouched; only the head is awaited

use std::error::Error as _;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{Deserialize, Serialize};

/// Failure class of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchErrorKind {
    /// The connection could not be established.
    Connect,
    /// No response head within the response timeout.
    Timeout,
    /// The connection failed after it was established.
    Io,
    /// The peer spoke invalid HTTP or the request could not be sent.
    Protocol,
}

impl fmt::Display for DispatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchErrorKind::Connect => "connect",
            DispatchErrorKind::Timeout => "timeout",
            DispatchErrorKind::Io => "io",
            DispatchErrorKind::Protocol => "protocol",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("upstream {kind} error calling {uri}: {message}")]
pub struct DispatchError {
    pub kind: DispatchErrorKind,
    pub uri: String,
    pub message: String,
}

impl DispatchError {
    pub fn new(kind: DispatchErrorKind, uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            uri: uri.into(),
            message: message.into(),
        }
    }
}

/// The gateway's view of "an HTTP engine that can send a request".
#[async_trait]
pub trait HttpClient: Send + Sync + fmt::Debug {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, DispatchError>;
}

/// [`HttpClient`] backed by the hyper-util connection pool.
#[derive(Clone)]
pub struct HyperClient {
    client: Client<HttpConnector, Body>,
    response_timeout: Duration,
}

impl HyperClient {
    pub fn new(connect_timeout: Duration, response_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            response_timeout,
        }
    }
}

impl fmt::Debug for HyperClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperClient")
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

#[async_trait]
impl HttpClient for HyperClient {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, DispatchError> {
        let uri = request.uri().to_string();

        let result = tokio::time::timeout(self.response_timeout, self.client.request(request)).await;
        match result {
            Ok(Ok(response)) => {
                let (parts, body) = response.into_parts();
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Ok(Err(e)) => {
                let kind = classify(&e);
                Err(DispatchError::new(kind, uri, e.to_string()))
            }
            Err(_) => Err(DispatchError::new(
                DispatchErrorKind::Timeout,
                uri,
                format!("no response within {:?}", self.response_timeout),
            )),
        }
    }
}

fn classify(error: &hyper_util::client::legacy::Error) -> DispatchErrorKind {
    if error.is_connect() {
        return DispatchErrorKind::Connect;
    }

    let mut source = error.source();
    while let Some(cause) = source {
        if cause.is::<std::io::Error>() {
            return DispatchErrorKind::Io;
        }
        if let Some(hyper_error) = cause.downcast_ref::<hyper::Error>() {
            if hyper_error.is_incomplete_message() || hyper_error.is_canceled() {
                return DispatchErrorKind::Io;
            }
        }
        source = cause.source();
    }
    DispatchErrorKind::Protocol
}
