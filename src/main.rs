//! Gateway adapter demo server.
//!
//! Serves the chat demo through the reference host: lifespan handshake,
//! graceful shutdown on Ctrl+C, optional Prometheus endpoint.

mod chat;

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use gateway_adapter::config::{load_config, validate_config, ConfigError, GatewayConfig};
use gateway_adapter::lifecycle::{shutdown_signal, Shutdown};
use gateway_adapter::observability::logging::{default_filter, init_logging};
use gateway_adapter::observability::metrics::init_metrics;
use gateway_adapter::{Dispatcher, GatewayServer, Request};

#[derive(Parser)]
#[command(name = "gateway-adapter")]
#[command(about = "Chat demo served through the gateway adapter", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    init_logging(&default_filter(&config.observability.log_level));
    tracing::info!("gateway-adapter v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_body_bytes = config.http.max_body_bytes,
        lifespan_timeout_secs = config.lifespan.timeout_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let chat = chat::Chat::new();
    let dispatcher = Dispatcher::new(move |request: Request| {
        let chat = chat.clone();
        async move { chat.handle(request).await }
    });

    GatewayServer::new(config, dispatcher).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
