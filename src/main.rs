//! Route Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                    ROUTE GATEWAY                      │
//!                       │                                                       │
//!   Client Request      │  ┌─────────┐    ┌─────────────┐    ┌──────────────┐  │
//!   ────────────────────┼─▶│  http   │───▶│   routing   │───▶│ filter chain │  │
//!                       │  │ server  │    │ route table │    │ (per route)  │  │
//!                       │  └─────────┘    └─────────────┘    └──────┬───────┘  │
//!                       │                                           │          │
//!                       │     ratelimit · cache · retry · headers   │          │
//!                       │     path rewrite · forwarded headers      ▼          │
//!   Client Response     │  ┌─────────┐                       ┌──────────────┐  │
//!   ◀───────────────────┼──│ handler │◀──────────────────────│  dispatcher  │◀─┼── Backend
//!                       │  └─────────┘                       └──────────────┘  │
//!                       │                                                       │
//!                       │  config (TOML + watcher) · admin API · observability  │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use route_gateway::lifecycle::{self, StartupOptions};

#[derive(Parser)]
#[command(name = "route-gateway")]
#[command(about = "Configurable HTTP API gateway", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Do not reload routes when the configuration file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    lifecycle::run(StartupOptions {
        config_path: cli.config,
        bind_address: cli.bind,
        watch: !cli.no_watch,
    })
    .await?;

    Ok(())
}
