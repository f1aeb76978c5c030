//! Filter-chain API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ route table ──▶ filter chain
//!                                                       │
//!                     WriteResponse(-1) ◀── route filters ◀┘
//!                          │                  │
//!                          │                  ▼
//!                          │         RouteToRequestUrl(10000)
//!                          │                  │
//!                          │                  ▼
//!                          │           Routing(MAX) ───────▶ Upstream
//!                          ▼                                   │
//!     Client Response ◀── streaming body ◀─────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use filter_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use filter_gateway::http::HttpServer;
use filter_gateway::lifecycle::{signals::spawn_signal_handler, Shutdown};
use filter_gateway::observability::init_logging;

#[derive(Parser, Debug)]
#[command(name = "filter-gateway", version, about = "Filter-chain API gateway")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload routes when the configuration file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        "filter-gateway starting"
    );

    let (config_updates, _watcher) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (rx, Some(watcher.run()?))
        }
        _ => {
            let (_, rx) = mpsc::unbounded_channel();
            (rx, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
