//! Admin API.
//!
//! # Endpoints
//! - `GET /admin/status`: version, route count, registered filter and predicate names
//! - `GET /admin/routes`: compiled routes in match order
//! - `POST /admin/refresh`: reload configuration and rebuild routes
//!
//! Every endpoint requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/refresh", post(post_refresh))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
