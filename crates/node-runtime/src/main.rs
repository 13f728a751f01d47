//! # Wavelink Node Runtime
//!
//! Runs a mesh of Wavelink peers over in-memory transports.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (TOML file from `WAVELINK_CONFIG` or the first
//!    argument, then `WAVELINK_*` overrides)
//! 2. Install the log subscriber (`RUST_LOG` wins over the config filter)
//! 3. Create the peers and start their background loops
//! 4. Bootstrap every peer from the seed
//! 5. Register, discover and exchange messages
//! 6. Wait for Ctrl+C or the configured run time, then shut down

use std::time::Duration;

use anyhow::{Context, Result};
use node_runtime::{NodeConfig, SimulatedMesh};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Load configuration from file and environment.
fn load_config() -> Result<NodeConfig> {
    let path = std::env::var("WAVELINK_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1));
    let mut config = match path {
        Some(path) => NodeConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => NodeConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

fn init_logging(config: &NodeConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config)?;

    info!("===========================================");
    info!("  Wavelink Node Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("  Peers: {}", config.simulation.nodes);
    info!("===========================================");

    let run_for = config.simulation.run_for_secs;
    let mut mesh = SimulatedMesh::new(config);
    mesh.start().await?;

    let report = mesh.run_workload().await?;
    info!(
        registered = report.registered,
        sent = report.sent,
        chunks = report.chunks,
        delivered = report.delivered,
        "workload complete"
    );

    if run_for == 0 {
        info!("Mesh is running. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::time::sleep(Duration::from_secs(run_for)).await;
    }

    mesh.shutdown().await;
    Ok(())
}
