//! Request-time errors and their HTTP rendering.
//!
//! Errors never leak internals to the client: every variant maps to a status
//! code and a small JSON document.

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use serde::Serialize;

use crate::http::client::{DispatchError, DispatchErrorKind};

/// Result type returned by filters and the dispatcher.
pub type GatewayResult = Result<Response<Body>, GatewayError>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no route matched the request")]
    NoRoute,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoRoute => StatusCode::NOT_FOUND,
            GatewayError::Dispatch(e) => match e.kind {
                DispatchErrorKind::Connect => StatusCode::SERVICE_UNAVAILABLE,
                DispatchErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                DispatchErrorKind::Io | DispatchErrorKind::Protocol => StatusCode::BAD_GATEWAY,
            },
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Body(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the error as a JSON response for the given request.
    pub fn to_response(&self, path: &str, request_id: &str) -> Response<Body> {
        let status = self.status();
        let body = ErrorBody {
            timestamp: chrono::Utc::now().to_rfc3339(),
            path,
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Unknown"),
            message: self.to_string(),
            request_id,
        };

        let json = serde_json::to_vec(&body).unwrap_or_default();
        let mut response = Response::new(Body::from(json));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

/// Renders without request context; handlers that know the path and request
/// id use [`GatewayError::to_response`].
impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        self.to_response("", "")
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    timestamp: String,
    path: &'a str,
    status: u16,
    error: &'static str,
    message: String,
    request_id: &'a str,
}
