//! pxup - Pixel Update Receiver
//!
//! Accepts one PXUP/PXUR display stream at a time over TCP and applies every
//! decoded frame to an in-memory RGB565 surface.

use clap::Parser;
use pxup_core::MemorySurface;
use pxup_server::metrics::run_metrics_server;
use pxup_server::{Config, Metrics, Server, ServerConfig, StatsReporter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pxup")]
#[command(about = "Receives pixel update streams and applies them to a framebuffer")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "PXUP_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Surface width in pixels (overrides config)
    #[arg(long)]
    width: Option<u16>,

    /// Surface height in pixels (overrides config)
    #[arg(long)]
    height: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load configuration (file if given, then env overrides, then flags)
    let mut config = match Config::load_from(args.config.as_deref()) {
        Ok(c) => {
            if let Some(ref path) = args.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if let Some(bind) = args.bind {
        config.network.bind_addr = bind;
    }
    if let Some(width) = args.width {
        config.surface.width = width;
    }
    if let Some(height) = args.height {
        config.surface.height = height;
    }

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting pxup receiver");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!(
        "  Surface: {}x{}",
        config.surface.width,
        config.surface.height
    );
    match config.decoder.max_entries() {
        Some(max) => tracing::info!("  Max entries per frame: {}", max),
        None => tracing::info!("  Max entries per frame: surface area"),
    }

    let mut server_config = ServerConfig::from_config(&config);

    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        server_config = server_config.with_metrics(metrics.clone());
        tracing::info!("  Metrics: enabled on {}", config.metrics.bind_addr);
        Some(metrics)
    } else {
        tracing::info!("  Metrics: disabled");
        None
    };

    let surface = MemorySurface::new(config.surface.width, config.surface.height);
    let mut server = Server::new(server_config, surface);
    let shutdown = server.shutdown_handle();

    // Spawn metrics server
    let metrics_handle = metrics.map(|metrics| {
        let addr = config.metrics.bind_addr;
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, shutdown_rx).await {
                tracing::error!("Metrics server error: {}", e);
            }
        })
    });

    // Spawn statistics reporter
    let stats_handle = tokio::spawn(
        StatsReporter::new(config.stats.interval()).run(server.subscribe(), shutdown.subscribe()),
    );

    // Spawn shutdown signal handler
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        signal_shutdown.shutdown();
    });

    // Run server (blocks until shutdown)
    let result = server.run().await;
    shutdown.shutdown();

    let _ = stats_handle.await;
    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    if let Some(ref path) = config.surface.snapshot_path {
        match server.surface().save_ppm(path) {
            Ok(()) => tracing::info!("Saved surface snapshot to {}", path.display()),
            Err(e) => tracing::error!("Failed to save snapshot to {}: {}", path.display(), e),
        }
    }

    result?;
    tracing::info!("Server stopped");
    Ok(())
}
