use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{StoreBackend, TollgateConfig};
use tollgate::http::HttpServer;
use tollgate::quota::QuotaEngine;
use tollgate::store::{MemoryWindowStore, RedisWindowStore, WindowStore};

#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "Quota-enforcing HTTP API gateway", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting Tollgate API Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = match args.config.as_deref() {
        Some(path) => TollgateConfig::from_file(path)?,
        None => TollgateConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(
        listen_addr = %config.server.listen_addr,
        limit = config.quota.limit,
        window_secs = config.quota.window_secs,
        "Configuration loaded"
    );

    let store: Arc<dyn WindowStore> = match config.store.backend {
        StoreBackend::Redis => Arc::new(RedisWindowStore::connect(&config.store).await?),
        StoreBackend::Memory => Arc::new(MemoryWindowStore::new()),
    };
    let engine = QuotaEngine::new(store, config.quota);
    info!("Quota engine initialized");

    let server = HttpServer::new(config.server.listen_addr, engine);
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Tollgate API Gateway stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
