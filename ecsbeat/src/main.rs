//! ecsbeat daemon: polls ECS management APIs for VDC and node topology.
//!
//! Loads the customer list from YAML, runs one discovery pass that may add
//! nodes, then keeps every auto-refreshing cluster fresh on its own interval
//! until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use common::config::EcsbeatConfig;
use ecsbeat::{start_refresh_config, EcsClusters, ShutdownSignal, TracingReporter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Refresh once, print the topology as JSON and exit.
    #[arg(long)]
    once: bool,
    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("📡 ecsbeat v{}", env!("CARGO_PKG_VERSION"));

    let path = config_path(args.config);
    let config = EcsbeatConfig::load_from_path(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    let fleet = EcsClusters::new(&config, Arc::new(TracingReporter))
        .context("Failed to build management clients")?;

    for cmd in fleet.commands() {
        info!(
            uri = %cmd.uri,
            cmd_type = %cmd.cmd_type,
            level = ?cmd.level,
            interval_secs = cmd.interval.as_secs(),
            "Command enabled"
        );
    }

    // Initial discovery is the only pass allowed to add nodes.
    let reports = fleet.refresh(true).await;
    let failed: usize = reports.iter().map(|r| r.failed_vdcs()).sum();
    if failed > 0 {
        warn!(failed_vdcs = failed, "Initial discovery incomplete");
    }

    if args.once {
        let snapshot = fleet.snapshot().await;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal.trigger();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    start_refresh_config(&fleet, shutdown.subscribe()).await;

    info!("ecsbeat stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ecsbeat=info,common=info".into());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// `--config`, then `$ECSBEAT_CONFIG`, then `~/.ecsbeat/ecsbeat.yml`,
/// then `./ecsbeat.yml`.
fn config_path(arg: Option<PathBuf>) -> PathBuf {
    if let Some(path) = arg {
        return path;
    }
    if let Ok(path) = std::env::var("ECSBEAT_CONFIG") {
        return PathBuf::from(path);
    }
    if let Some(home) = dirs::home_dir() {
        let path = home.join(".ecsbeat").join("ecsbeat.yml");
        if path.exists() {
            return path;
        }
    }
    PathBuf::from("ecsbeat.yml")
}
