use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use tab_relay::config::{DataDir, FileConfig, RelayConfig, listen_addr, load_config};
use tab_relay::identity::ServerIdentity;
use tab_relay::{AppState, build_router};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay commands from an automation controller to live browser tabs")]
struct Cli {
    /// Port for the web server (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Custom data directory (defaults to ~/.tab_relay)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "tab_relay=debug,relay=debug,tower_http=debug,info"
    } else {
        "tab_relay=info,relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting tab relay");

    let data_dir = DataDir::new(cli.data_dir)?;
    let file_config: FileConfig = load_config(&data_dir.path)
        .extract()
        .with_context(|| {
            format!(
                "Failed to load configuration from {}",
                data_dir.config_toml_path().display()
            )
        })?;

    let identity = ServerIdentity::load_or_generate(&data_dir.path)?;
    let fingerprint = identity.fingerprint();
    let relay_config = RelayConfig::from_file(&file_config.relay);
    info!(
        "Tab TTL: {}s, send channel capacity: {}",
        relay_config.tab_ttl.as_secs(),
        relay_config.send_channel_capacity
    );

    let app = build_router(AppState::new(relay_config, identity));

    let addr = listen_addr(&file_config.server, cli.host.as_deref(), cli.port)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let actual_addr = listener.local_addr()?;

    info!("Tab relay listening on ws://{}/ws", actual_addr);
    info!("Server fingerprint: {}", fingerprint);
    info!("Clients pinning this server should append !{} to the URL", fingerprint);
    info!("Endpoints:");
    info!("  GET /ws           - Relay WebSocket");
    info!("  GET /health       - Server and registry status");
    info!("  GET /health/live  - Liveness probe");
    info!("  GET /metrics      - Counters");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
