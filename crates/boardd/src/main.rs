//! boardd - the devops board daemon
//!
//! Loads the configuration, wires the record store and the remote clients,
//! starts the background jobs and serves the HTTP API until SIGINT/SIGTERM.

mod api;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use board_core::telemetry::init_tracing;
use board_core::{Board, BoardConfig, DEFAULT_CONFIG_FILE};
use board_remote::{BitbucketClient, BuildClients, SourceControlClient};
use board_state::open_store;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "boardd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Devops board: source-control mirror, build tracking and releases", long_about = None)]
struct Cli {
    /// Configuration file (YAML); a missing file means defaults plus environment
    #[arg(short, long, env = "BOARD_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the HTTP port from the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let mut config = BoardConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let records = open_store(config.store.url.as_deref())
        .await
        .context("opening record store")?;
    let source: Arc<dyn SourceControlClient> = Arc::new(
        BitbucketClient::new(&config.source_control.server())
            .context("building source-control client")?,
    );
    let build_clients =
        BuildClients::from_servers(&config.build.servers).context("building build clients")?;

    let port = config.server.port;
    let board = Arc::new(Board::new(config, records, source, build_clients));
    let scheduler = board.start();

    let app = api::router(board.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "Board API listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.shutdown().await;
    served.context("HTTP server failed")?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["boardd"]).unwrap();
        assert!(!cli.verbose);
        assert!(!cli.json);
        assert!(cli.port.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from(["boardd", "-c", "board.yml", "-p", "8080", "-v", "--json"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("board.yml"));
        assert_eq!(cli.port, Some(8080));
        assert!(cli.verbose);
        assert!(cli.json);
    }
}
