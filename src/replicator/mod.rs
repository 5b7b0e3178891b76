// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replicator lifecycle and wiring.
//!
//! The replicator owns the two store pools, the change source, the
//! applier, the status registry, and the tick task. Its lifecycle is the
//! three-state machine in [`ReplicatorState`]: construct (stores verified
//! reachable), start (begin ticking), stop (graceful, current tick
//! finishes), close (release pools).
//!
//! # Concurrency
//!
//! Exactly two actors share state: the tick task mutates the status
//! registry, and the reporting surface reads snapshots of it. Store calls
//! are synchronous from the loop's perspective; one tick runs at a time,
//! enforced by a gate shared with [`tick_now`](Replicator::tick_now).

mod tick;
mod types;

pub use types::{ReplicatorState, TickSummary};

use crate::applier::{ChangeApplier, SqlApplier};
use crate::config::{ReplicatorConfig, SourceKind};
use crate::error::{ReplicationError, Result, StoreRole};
use crate::metrics;
use crate::source::{CaptureFeedSource, ChangeLogSource, ChangeSource};
use crate::status::StatusRegistry;
use crate::store;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

/// The single-table change replicator.
pub struct Replicator {
    config: ReplicatorConfig,
    source: Arc<dyn ChangeSource>,
    applier: Arc<dyn ChangeApplier>,
    status: Arc<StatusRegistry>,
    primary: Option<SqlitePool>,
    secondary: Option<SqlitePool>,
    state_tx: watch::Sender<ReplicatorState>,
    state_rx: watch::Receiver<ReplicatorState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tick_gate: Arc<Mutex<()>>,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Replicator {
    /// Connect to both stores and build the configured source backend.
    ///
    /// Verifies reachability of both stores and installs the capture
    /// plumbing and the replicated table schema. Any failure here is
    /// fatal: the process must not start the loop or the reporting
    /// surface without both stores verified.
    pub async fn connect(config: ReplicatorConfig) -> Result<Self> {
        config.validate()?;

        let primary = store::connect(&config.primary_url, StoreRole::Primary).await?;
        let secondary = store::connect(&config.secondary_url, StoreRole::Secondary).await?;

        store::ensure_users_table(&secondary, StoreRole::Secondary).await?;

        let source: Arc<dyn ChangeSource> = match config.source {
            SourceKind::ChangeLog => {
                store::ensure_users_table(&primary, StoreRole::Primary).await?;
                ChangeLogSource::install(&primary).await?;
                Arc::new(ChangeLogSource::new(primary.clone()))
            }
            SourceKind::CaptureFeed => {
                CaptureFeedSource::install(&primary).await?;
                Arc::new(CaptureFeedSource::new(primary.clone()))
            }
        };
        let applier = Arc::new(SqlApplier::new(secondary.clone()));

        info!(source = %config.source, "Replicator constructed");
        Ok(Self::assemble(
            config,
            source,
            applier,
            Some(primary),
            Some(secondary),
        ))
    }

    /// Build a replicator from pre-wired parts.
    ///
    /// The caller keeps ownership of any underlying pools; `close()` only
    /// releases pools opened by [`connect`](Self::connect).
    pub fn from_parts(
        config: ReplicatorConfig,
        source: Arc<dyn ChangeSource>,
        applier: Arc<dyn ChangeApplier>,
    ) -> Self {
        Self::assemble(config, source, applier, None, None)
    }

    fn assemble(
        config: ReplicatorConfig,
        source: Arc<dyn ChangeSource>,
        applier: Arc<dyn ChangeApplier>,
        primary: Option<SqlitePool>,
        secondary: Option<SqlitePool>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ReplicatorState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        metrics::set_loop_state("Idle");

        Self {
            config,
            source,
            applier,
            status: Arc::new(StatusRegistry::new()),
            primary,
            secondary,
            state_tx,
            state_rx,
            shutdown_tx,
            shutdown_rx,
            tick_gate: Arc::new(Mutex::new(())),
            loop_handle: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReplicatorState {
        *self.state_rx.borrow()
    }

    /// Check if the loop is ticking.
    pub fn is_running(&self) -> bool {
        self.state() == ReplicatorState::Running
    }

    /// Watch lifecycle state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ReplicatorState> {
        self.state_rx.clone()
    }

    /// Watch the stop signal (used by the reporting surface for its own
    /// graceful shutdown).
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Shared status registry, read by the reporting surface.
    pub fn status(&self) -> Arc<StatusRegistry> {
        Arc::clone(&self.status)
    }

    /// Start ticking.
    ///
    /// Transitions `Idle → Running` and spawns the loop task. Starting a
    /// replicator that is not idle is an error.
    pub async fn start(&self) -> Result<()> {
        if self.state() != ReplicatorState::Idle {
            return Err(ReplicationError::InvalidState {
                expected: "Idle".to_string(),
                actual: self.state().to_string(),
            });
        }

        self.status.set_running(true).await;
        let _ = self.state_tx.send(ReplicatorState::Running);
        metrics::set_loop_state("Running");

        let handle = tokio::spawn(tick::run_loop(
            Arc::clone(&self.source),
            Arc::clone(&self.applier),
            Arc::clone(&self.status),
            Arc::clone(&self.tick_gate),
            self.config.poll_interval_duration(),
            self.config.batch_size,
            self.shutdown_rx.clone(),
        ));
        *self.loop_handle.lock().await = Some(handle);

        info!(
            interval = %self.config.poll_interval,
            batch_size = self.config.batch_size,
            "Replication started"
        );
        Ok(())
    }

    /// Stop ticking gracefully.
    ///
    /// Signals the loop and waits for it to exit. Cancellation is
    /// cooperative: an in-flight tick finishes its current store call and
    /// the signal is observed at the next boundary. Idempotent; stopping
    /// an idle replicator just moves it to `Stopped`.
    pub async fn stop(&self) {
        if self.state() == ReplicatorState::Stopped {
            return;
        }

        info!("Stopping replication");
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.loop_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Replication loop task panicked");
            }
        }

        self.status.set_running(false).await;
        let _ = self.state_tx.send(ReplicatorState::Stopped);
        metrics::set_loop_state("Stopped");
        info!("Replication stopped");
    }

    /// Run one tick immediately, outside the timer schedule.
    ///
    /// Serialized with the loop through the tick gate, so a manual pass
    /// never overlaps a scheduled one. Useful for diagnostics and tests.
    pub async fn tick_now(&self) -> Result<TickSummary> {
        tick::execute_tick(
            self.source.as_ref(),
            self.applier.as_ref(),
            &self.status,
            &self.tick_gate,
            self.config.batch_size,
        )
        .await
    }

    /// Release the store pools opened by [`connect`](Self::connect).
    pub async fn close(&self) {
        if let Some(pool) = &self.primary {
            pool.close().await;
        }
        if let Some(pool) = &self.secondary {
            pool.close().await;
        }
    }
}
