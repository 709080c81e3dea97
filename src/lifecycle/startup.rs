//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging, then the route table
//! - Start background tasks (config watcher, admin API, signal handler)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The gateway listener starts last (traffic only when ready)

use std::path::PathBuf;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::admin::setup_admin_router;
use crate::config::{load_config, ConfigError, ConfigWatcher, GatewayConfig};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::observability::init_logging;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config watcher: {0}")]
    Watch(#[from] notify::Error),
}

/// What the binary was asked to start.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    /// TOML configuration file; defaults are used when absent.
    pub config_path: Option<PathBuf>,
    /// Overrides `listener.bind_address`.
    pub bind_address: Option<String>,
    /// Watch the configuration file and apply changes.
    pub watch: bool,
}

/// Run the gateway until a termination signal arrives.
pub async fn run(options: StartupOptions) -> Result<(), StartupError> {
    let mut config = match &options.config_path {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = &options.bind_address {
        config.listener.bind_address = bind.clone();
    }

    init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?options.config_path,
        routes = config.routes.len(),
        "route-gateway starting"
    );

    let mut server = HttpServer::new(config.clone())?;
    if let Some(path) = &options.config_path {
        server = server.with_config_path(path.clone());
    }

    let (_updates_tx, mut updates) = mpsc::unbounded_channel();
    let mut _watcher = None;
    if let (true, Some(path)) = (options.watch, &options.config_path) {
        let (watcher, rx) = ConfigWatcher::new(path);
        _watcher = Some(watcher.run()?);
        updates = rx;
    }

    let shutdown = Shutdown::new();

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let app = setup_admin_router(server.state());
        let mut admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let result = axum::serve(admin_listener, app)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    server.run(listener, updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
