//! s3layer server
//!
//! ```text
//! s3layer --disk /data                       # FS backend
//! s3layer --disk /d1 --disk /d2 ... --disk /d8  # XL backend, 4+4
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use s3layer::server::{self, ServerState};
use s3layer::Config;

// =============================================================================
// CLI Arguments
// =============================================================================

/// S3-compatible object storage server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "S3LAYER_CONFIG")]
    config: Option<PathBuf>,

    /// Disk root; repeat for an erasure-coded set of 4 to 16 disks
    #[arg(long = "disk", env = "S3LAYER_DISKS", value_delimiter = ',')]
    disks: Vec<PathBuf>,

    /// S3 API bind address
    #[arg(long, env = "S3LAYER_ADDRESS")]
    address: Option<String>,

    /// Health and metrics bind address
    #[arg(long, env = "S3LAYER_METRICS_ADDRESS")]
    metrics_address: Option<String>,

    /// Object cache capacity in bytes
    #[arg(long, env = "S3LAYER_CACHE_SIZE")]
    cache_size: Option<u64>,

    /// Disable the object cache
    #[arg(long, env = "S3LAYER_NO_CACHE")]
    no_cache: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Load the config file, if any, and apply flags on top
    fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        };

        if !self.disks.is_empty() {
            config.storage.disks = self.disks.clone();
        }
        if let Some(address) = &self.address {
            config.server.address = address.clone();
        }
        if let Some(address) = &self.metrics_address {
            config.server.metrics_address = address.clone();
        }
        if let Some(capacity) = self.cache_size {
            config.cache.capacity = capacity;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = args.resolve_config()?;

    info!("Starting s3layer");
    info!("  Backend: {}", config.storage.backend_kind());
    info!("  Disks: {}", config.storage.disks.len());
    info!("  Cache enabled: {}", config.cache.enabled);

    let store = Arc::new(config.build_store().await?);
    let state = Arc::new(ServerState::new(store)?);

    let api_listener = server::bind(&config.server.address).await?;
    let health_listener = server::bind(&config.server.metrics_address).await?;

    // Start health and metrics server
    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_health_server(health_state, health_listener).await {
            error!("Health server error: {}", e);
        }
    });

    // Trigger shutdown on Ctrl-C
    let signal_state = state.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_state.begin_shutdown(),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    server::serve(state.clone(), api_listener, config.server.shutdown_grace()).await?;

    info!(uptime_secs = state.uptime().as_secs(), "Server shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

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
}
