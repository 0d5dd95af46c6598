use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tank_arena_server::config::ServerConfig;
use tank_arena_server::metrics::{self, Metrics};
use tank_arena_server::net::dispatch::ServerContext;
use tank_arena_server::net::transport::ArenaServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Tank Arena Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    info!(
        "Configuration loaded: {}:{}, protocol={}, max_message_size={}, outbound_queue_size={}",
        config.bind_address,
        config.port,
        config.protocol,
        config.max_message_size,
        config.outbound_queue_size
    );

    let map_definition = config
        .load_map_definition()
        .context("Failed to load map definition")?;
    if map_definition.is_empty() {
        info!("No map configured, lobbies start without map data");
    }

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());

    if config.metrics_port != 0 {
        let metrics_clone = metrics.clone();
        let metrics_port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    // Initialize shared state
    let context = Arc::new(ServerContext::from_config(&config, map_definition, metrics)?);
    let server = ArenaServer::new(config, context.clone());

    // Shutdown signal handler
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    // Run server with graceful shutdown
    let result = tokio::select! {
        result = server.run() => result,
        _ = shutdown => {
            info!("Shutting down...");
            Ok(())
        }
    };

    // Cleanup
    context.lobbies.shutdown_all();
    info!(
        "Server stopped ({} sessions were connected)",
        context.sessions.count()
    );

    result
}
