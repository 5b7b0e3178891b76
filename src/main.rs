//! Replicator daemon.
//!
//! Wires the replicator to its stores, starts the loop, serves the
//! status/health endpoints, and handles shutdown signals: an interrupt
//! requests a graceful stop (the current tick finishes), then the
//! reporting surface gets a bounded window to drain before the process
//! exits.

use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use table_replicator::{http, Replicator, ReplicatorConfig, SourceKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long the reporting surface gets to drain after stop.
const HTTP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "replicatord", about = "Single-table change replicator")]
struct Args {
    /// Connection URL of the primary store (changes are captured here)
    #[arg(long, env = "REPLICATOR_PRIMARY_URL")]
    primary_url: String,

    /// Connection URL of the secondary store (changes are applied here)
    #[arg(long, env = "REPLICATOR_SECONDARY_URL")]
    secondary_url: String,

    /// Change-capture backend: change_log or capture_feed
    #[arg(long, env = "REPLICATOR_SOURCE", default_value = "change_log")]
    source: SourceKind,

    /// Poll interval (e.g. "5s", "500ms")
    #[arg(long, env = "REPLICATOR_POLL_INTERVAL", default_value = "5s")]
    poll_interval: String,

    /// Maximum change records fetched per tick
    #[arg(long, env = "REPLICATOR_BATCH_SIZE", default_value_t = 100)]
    batch_size: usize,

    /// Listen address for the status/health endpoints
    #[arg(long, env = "REPLICATOR_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,
}

impl Args {
    fn into_config(self) -> ReplicatorConfig {
        ReplicatorConfig {
            primary_url: self.primary_url,
            secondary_url: self.secondary_url,
            source: self.source,
            poll_interval: self.poll_interval,
            batch_size: self.batch_size,
            listen_addr: self.listen_addr,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();
    let listen_addr = config.listen_addr.clone();

    // Both stores must be reachable before anything starts
    let replicator = Replicator::connect(config)
        .await
        .context("failed to construct replicator")?;

    replicator.start().await.context("failed to start replication")?;

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    let server = tokio::spawn(http::serve(
        listener,
        replicator.status(),
        replicator.shutdown_receiver(),
    ));

    wait_for_shutdown_signal().await;
    info!("Shutting down");

    // Stop the loop first (lets the in-flight tick finish), which also
    // triggers the reporting surface's graceful shutdown
    replicator.stop().await;

    match tokio::time::timeout(HTTP_SHUTDOWN_TIMEOUT, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "Reporting surface error"),
        Ok(Err(e)) => error!(error = %e, "Reporting surface task panicked"),
        Err(_) => warn!("Reporting surface did not drain in time"),
    }

    replicator.close().await;
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
