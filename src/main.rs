//! RPC fallback tracker service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Consumer                ┌──────────────────────────────────────────────┐
//!     ────────────────────────┼─▶ admin API ──▶ TrackerRegistry              │
//!     GET /endpoints/{key}/   │                    │                         │
//!         current             │                    ▼                         │
//!                             │              FallbackTracker (per group)     │
//!                             │                    │                         │
//!                             │     ┌──────────────┼──────────────┐          │
//!                             │     ▼              ▼              ▼          │
//!     RPC nodes ◀─────────────┼── RpcProbe    failure ledger   ranking       │
//!                             │                    │                         │
//!                             │                    ▼                         │
//!                             │             throttle → publish → store       │
//!                             └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use rpc_fallback_tracker::admin::{serve_admin, setup_admin_router};
use rpc_fallback_tracker::config::loader::load_config;
use rpc_fallback_tracker::config::ServiceConfig;
use rpc_fallback_tracker::health::{RpcCheckStats, RpcProbe, SharedProbe};
use rpc_fallback_tracker::lifecycle::{signals::wait_for_signal, Shutdown};
use rpc_fallback_tracker::observability::{logging, metrics};
use rpc_fallback_tracker::persistence::{FileStore, MemoryStore, SharedStore};
use rpc_fallback_tracker::ranking::BlockLagLatency;
use rpc_fallback_tracker::tracker::TrackerRegistry;

#[derive(Parser)]
#[command(name = "rpc-fallback-tracker", version, about = "Tracks RPC endpoint health and picks fallbacks")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        groups = config.groups.len(),
        "rpc-fallback-tracker starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store: SharedStore = match &config.persistence.dir {
        Some(dir) => {
            tracing::info!(dir = %dir, "Persisting snapshots to disk");
            Arc::new(FileStore::new(dir)?)
        }
        None => {
            tracing::warn!("No persistence directory configured, snapshots are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let probe: SharedProbe<RpcCheckStats> = Arc::new(RpcProbe::new(&config.probe));
    let registry = Arc::new(
        TrackerRegistry::new(probe, store)
            .with_defaults(config.tracker.clone())
            .with_scorer(Arc::new(BlockLagLatency::new(config.probe.block_lag_penalty_ms))),
    );
    registry.register_groups(&config);

    let shutdown = Shutdown::new();
    let admin = if config.admin.enabled {
        if config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
            tracing::warn!("Admin API is using the default api_key");
        }
        let addr: SocketAddr = config.admin.bind_address.parse()?;
        let listener = TcpListener::bind(addr).await?;
        let router = setup_admin_router(registry.clone(), &config.admin.api_key);
        let mut signal = shutdown.subscribe();
        Some(tokio::spawn(serve_admin(listener, router, async move {
            signal.wait().await
        })))
    } else {
        tracing::info!("Admin API disabled");
        None
    };

    wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();

    if let Some(handle) = admin {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
        }
    }
    registry.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
