//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all gateway handler
//! - Wire up middleware (request id, tracing, request timeout)
//! - Hold the live route table and swap it on configuration updates
//! - Bind to a listener and shut down gracefully on signal
//!
//! # Design Decisions
//! - A configuration that fails to build is logged and dropped; the routes
//!   already in service stay in service
//! - The upstream client and clock are injectable so the whole server can be
//!   driven in tests without a network

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{http::HeaderName, routing::any, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::clock::{Clock, SystemClock};
use crate::config::{load_config, ConfigError, GatewayConfig};
use crate::filter::Dispatch;
use crate::http::client::{HttpClient, HyperClient};
use crate::http::dispatch::Dispatcher;
use crate::http::exchange::X_REQUEST_ID;
use crate::http::handler::gateway_handler;
use crate::ratelimit::InMemoryRateLimitStore;
use crate::routing::{RouteBuilder, RouteTable};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub config: Arc<ArcSwap<GatewayConfig>>,
    pub builder: Arc<RouteBuilder>,
    pub dispatcher: Arc<dyn Dispatch>,
    /// Address the gateway listener is bound to, once known.
    pub local_addr: Option<SocketAddr>,
    /// File the configuration was loaded from, used by admin refresh.
    pub config_path: Option<Arc<PathBuf>>,
}

impl AppState {
    /// Build routes for `config` and publish both. On error nothing changes.
    pub fn apply(&self, config: GatewayConfig) -> Result<usize, ConfigError> {
        let set = self.builder.build(&config)?;
        let count = set.len();
        self.routes.replace(set);
        self.config.store(Arc::new(config));
        Ok(count)
    }

    /// Re-read the configuration file, or rebuild from the current
    /// configuration when the gateway was not started from a file.
    pub fn refresh(&self) -> Result<usize, ConfigError> {
        let config = match &self.config_path {
            Some(path) => load_config(path)?,
            None => GatewayConfig::clone(&self.config.load()),
        };
        self.apply(config)
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a server that dispatches through a pooled hyper client.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let client = HyperClient::new(
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.response_secs),
        );
        Self::with_components(config, Arc::new(client), Arc::new(SystemClock))
    }

    /// Create a server with an explicit upstream client and clock.
    pub fn with_components(
        config: GatewayConfig,
        client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let builder = RouteBuilder::new(Arc::new(InMemoryRateLimitStore::new()), clock);
        let routes = builder.build(&config)?;

        tracing::info!(
            routes = routes.len(),
            bind_address = %config.listener.bind_address,
            "Gateway configured"
        );

        let state = AppState {
            routes: Arc::new(RouteTable::new(routes)),
            config: Arc::new(ArcSwap::from_pointee(config)),
            builder: Arc::new(builder),
            dispatcher: Arc::new(Dispatcher::new(client)),
            local_addr: None,
            config_path: None,
        };
        Ok(Self { state })
    }

    /// Remember where the configuration came from, for admin refresh.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state.config_path = Some(Arc::new(path.into()));
        self
    }

    /// Shared state, e.g. for mounting the admin API.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let request_secs = self.state.config.load().timeouts.request_secs;
        let x_request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .route("/", any(gateway_handler))
            .route("/{*path}", any(gateway_handler))
            .with_state(self.state.clone())
            .layer(TimeoutLayer::new(Duration::from_secs(request_secs)))
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configurations arriving on `updates` are compiled and swapped in
    /// while the server runs.
    pub async fn run(
        mut self,
        listener: TcpListener,
        mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        self.state.local_addr = Some(addr);
        tracing::info!(address = %addr, "HTTP server starting");

        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                match state.apply(config) {
                    Ok(routes) => tracing::info!(routes, "Configuration applied"),
                    Err(e) => tracing::error!(
                        error = %e,
                        "Failed to build routes, keeping current configuration"
                    ),
                }
            }
        });

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
