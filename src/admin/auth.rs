use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::server::AppState;

/// Require `Authorization: Bearer <admin.api_key>`.
///
/// The key is read from the live configuration, so a refresh that changes it
/// takes effect on the next request.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let config = state.config.load_full();

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if !config.admin.api_key.is_empty() && token == config.admin.api_key => {
            Ok(next.run(request).await)
        }
        _ => {
            tracing::warn!(path = %request.uri().path(), "Admin request rejected");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
