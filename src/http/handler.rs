//! The catch-all gateway handler.
//!
//! # Data Flow
//! ```text
//! Request (request id already set by the tower stack)
//!     → Exchange (peer + local address, original URI)
//!     → RouteTable::lookup (weights drawn, first matching route)
//!     → route.filters.execute(exchange, dispatcher)
//!     → Response, or GatewayError rendered as JSON
//! ```

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
};

use crate::http::error::GatewayError;
use crate::http::exchange::Exchange;
use crate::http::server::AppState;
use crate::observability::metrics;

pub async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let mut exchange = Exchange::new(request, peer);
    if let Some(local) = state.local_addr {
        exchange = exchange.with_local_addr(local);
    }
    let request_id = exchange.attributes().request_id.clone();

    let Some(route) = state.routes.lookup(&mut exchange) else {
        tracing::warn!(request_id = %request_id, method = %method, path = %path, "No route matched");
        metrics::record_request("none", &method, 404, start);
        return GatewayError::NoRoute.to_response(&path, &request_id);
    };
    exchange.set_route(route.clone());

    tracing::debug!(
        request_id = %request_id,
        route = %route.id,
        method = %method,
        path = %path,
        "Route matched"
    );

    let response = match route.filters.execute(exchange, state.dispatcher.as_ref()).await {
        Ok(response) => response,
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::error!(request_id = %request_id, route = %route.id, status = %status, error = %e, "Request failed");
            } else {
                tracing::warn!(request_id = %request_id, route = %route.id, status = %status, error = %e, "Request rejected");
            }
            e.to_response(&path, &request_id)
        }
    };

    metrics::record_request(&route.id, &method, response.status().as_u16(), start);
    response
}
