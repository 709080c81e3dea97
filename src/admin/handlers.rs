use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::config::ConfigError;
use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub routes: usize,
    pub filters: Vec<&'static str>,
    pub predicates: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct RouteView {
    pub id: String,
    pub uri: String,
    pub order: i32,
    pub filters: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshOutcome {
    pub refreshed: bool,
    pub routes: usize,
}

#[derive(Debug, Serialize)]
pub struct AdminError {
    pub error: String,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        routes: state.routes.snapshot().len(),
        filters: state.builder.filter_names(),
        predicates: state.builder.predicate_names(),
    })
}

/// Routes in match order, with their fully assembled filter chains.
pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<RouteView>> {
    let set = state.routes.snapshot();
    let routes = set
        .routes()
        .iter()
        .map(|route| RouteView {
            id: route.id.clone(),
            uri: route.uri.to_string(),
            order: route.order,
            filters: route.filters.names(),
            metadata: route.metadata.clone(),
        })
        .collect();
    Json(routes)
}

/// Reload configuration and rebuild every route.
pub async fn post_refresh(
    State(state): State<AppState>,
) -> Result<Json<RefreshOutcome>, (StatusCode, Json<AdminError>)> {
    match state.refresh() {
        Ok(routes) => {
            tracing::info!(routes, "Routes refreshed via admin API");
            Ok(Json(RefreshOutcome {
                refreshed: true,
                routes,
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "Admin refresh failed, keeping current routes");
            let status = match e {
                ConfigError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            Err((status, Json(AdminError { error: e.to_string() })))
        }
    }
}
