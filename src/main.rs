//! Status monitoring daemon binary

use clap::Parser;
use statuswatch::{HttpProber, LogNotifier, MonitorConfig, MonitoringEngine, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "statuswatch", version, about = "Service status monitoring engine")]
struct Args {
    /// Path to the services configuration file
    #[arg(short, long, env = "STATUSWATCH_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    /// Override the monitoring cycle interval in milliseconds
    #[arg(long, env = "CHECK_INTERVAL_MS")]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    initialize_tracing();

    let args = Args::parse();
    info!("Starting statuswatch v{}", env!("CARGO_PKG_VERSION"));

    let mut config = MonitorConfig::load(&args.config)?;
    if let Some(interval_ms) = args.interval_ms {
        config.check_interval_ms = interval_ms;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!(
        services = config.services.len(),
        interval_ms = config.check_interval_ms,
        "configuration loaded from {}",
        args.config.display()
    );

    let prober = Arc::new(HttpProber::new(config.probe_timeout_ms)?);
    let notifier = Arc::new(LogNotifier);
    let (mut engine, mut events) = MonitoringEngine::new(config, prober, notifier);

    // Event drain stands in for the dashboard transport: every published
    // event goes to the structured log as JSON
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(payload) => info!(target: "statuswatch::events", "{}", payload),
                Err(e) => error!("failed to serialize event: {}", e),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    engine.run(shutdown_rx).await;

    info!("statuswatch shutdown complete");
    Ok(())
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
