//! Ubiquity CSI plugin
//!
//! Loads the plugin configuration, activates the configured backends on the
//! remote storage server and serves the lifecycle API.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ubiquity_csi::domain::ports::ActivateRequest;
use ubiquity_csi::{
    ApiServer, ApiServerConfig, ControllerAdapter, Metrics, PluginConfig, RemoteStorageClient,
    StorageClient,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Ubiquity CSI - volume lifecycle plugin for the Ubiquity storage service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Plugin configuration file (YAML)
    #[arg(long, env = "UBIQUITY_CONFIG")]
    config: Option<PathBuf>,

    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: SocketAddr,

    /// Name this node reports as its hostname
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => PluginConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            warn!("No config file given, using defaults");
            PluginConfig::default()
        }
    };
    let node_name = args.node_name.clone().unwrap_or_else(local_hostname);

    info!("Starting Ubiquity CSI plugin");
    info!("  Version: {}", ubiquity_csi::VERSION);
    info!("  Storage API: {}", config.storage_api_url());
    info!("  REST API: {}", args.api_addr);
    info!("  Node: {}", node_name);

    let client = Arc::new(
        RemoteStorageClient::from_config(&config).context("failed to create storage client")?,
    );

    let ready = Arc::new(AtomicBool::new(false));
    if !config.backends.is_empty() {
        client
            .activate(ActivateRequest {
                backends: config.backends.clone(),
                ..Default::default()
            })
            .await
            .context("failed to activate backends")?;
    }
    ready.store(true, Ordering::SeqCst);

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let adapter = Arc::new(ControllerAdapter::new(
        client,
        config.plugin_name.clone(),
        node_name,
        metrics,
    ));

    let api_config = ApiServerConfig {
        rest_addr: args.api_addr,
    };
    let server = Arc::new(ApiServer::new(api_config, adapter, ready));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_server.shutdown();
        }
    });

    server.run().await.context("API server failed")?;

    info!("Plugin shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=info".parse()?)
        .add_directive("tower=warn".parse()?)
        .add_directive("axum=info".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

fn local_hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
