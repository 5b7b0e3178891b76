// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tick execution: fetch → apply → checkpoint → status update.
//!
//! One tick is one bounded pass over the pending changes. Records are
//! applied strictly in ascending sequence order; skippable records are
//! recorded as processed without touching the secondary, so they are
//! checkpointed and never fetched again.
//!
//! # Failure Containment
//!
//! The first fetch, apply, or commit error abandons the rest of the tick.
//! Nothing from the abandoned tick is checkpointed, so the next tick
//! re-fetches the same records; re-applying them is safe because applies
//! are idempotent. Earlier records of the abandoned tick that did apply
//! are redone next tick, which duplicates work but never final state.
//!
//! # Graceful Shutdown
//!
//! The loop waits on the stop signal and the interval timer together and
//! observes cancellation only at tick boundaries; an in-flight store call
//! is never interrupted. The timer uses delayed rescheduling, so a slow
//! tick pushes the next one out instead of overlapping it.

use crate::applier::ChangeApplier;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::replicator::types::TickSummary;
use crate::source::ChangeSource;
use crate::status::StatusRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Run the replication loop until the stop signal is observed.
pub(crate) async fn run_loop(
    source: Arc<dyn ChangeSource>,
    applier: Arc<dyn ChangeApplier>,
    status: Arc<StatusRegistry>,
    tick_gate: Arc<Mutex<()>>,
    poll_interval: Duration,
    batch_size: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut timer = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
    // A slow tick delays the next instead of bunching missed ticks
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                // A dropped sender counts as a stop request
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Replication loop observed stop signal");
                    break;
                }
            }

            _ = timer.tick() => {
                // Tick errors are contained here; the loop never exits on
                // error, only on explicit stop
                let _ = execute_tick(
                    source.as_ref(),
                    applier.as_ref(),
                    &status,
                    &tick_gate,
                    batch_size,
                )
                .await;
            }
        }
    }
}

/// Run one tick and reflect its outcome in the status registry.
///
/// The gate serializes ticks with any ad hoc [`tick_now`] callers so two
/// passes never run concurrently.
///
/// [`tick_now`]: crate::Replicator::tick_now
pub(crate) async fn execute_tick(
    source: &dyn ChangeSource,
    applier: &dyn ChangeApplier,
    status: &StatusRegistry,
    tick_gate: &Mutex<()>,
    batch_size: usize,
) -> Result<TickSummary> {
    let _guard = tick_gate.lock().await;
    let started = Instant::now();

    match run_tick(source, applier, batch_size).await {
        Ok(summary) => {
            status
                .record_tick_success(summary.applied, summary.checkpoint.clone())
                .await;
            metrics::record_tick(
                summary.fetched,
                summary.applied,
                summary.skipped,
                started.elapsed(),
            );
            if !summary.is_empty() {
                info!(
                    fetched = summary.fetched,
                    applied = summary.applied,
                    skipped = summary.skipped,
                    "Replicated changes"
                );
            }
            Ok(summary)
        }
        Err(e) => {
            if e.is_recoverable() {
                warn!(error = %e, "Tick failed, retrying next interval");
            } else {
                error!(error = %e, "Tick failed with non-recoverable error");
            }
            status.record_tick_error(e.to_string()).await;
            metrics::record_tick_error(failed_stage(&e));
            Err(e)
        }
    }
}

/// Fetch, apply, and checkpoint one batch.
async fn run_tick(
    source: &dyn ChangeSource,
    applier: &dyn ChangeApplier,
    batch_size: usize,
) -> Result<TickSummary> {
    let batch = source.fetch_batch(batch_size).await?;
    if batch.is_empty() {
        return Ok(TickSummary::default());
    }

    debug_assert!(
        batch.windows(2).all(|w| w[0].sequence <= w[1].sequence),
        "source returned a batch out of sequence order"
    );

    let mut processed = Vec::with_capacity(batch.len());
    let mut applied = 0u64;
    let mut skipped = 0u64;

    for record in &batch {
        match record.check_applicable() {
            Some(reason) => {
                debug!(
                    sequence = %record.sequence,
                    op = %record.operation,
                    %reason,
                    "Skipping malformed record"
                );
                skipped += 1;
            }
            None => {
                applier.apply(record).await?;
                applied += 1;
            }
        }
        processed.push(record.sequence.clone());
    }

    source.commit_checkpoint(&processed).await?;
    metrics::record_checkpoint_commit(processed.len());

    Ok(TickSummary {
        fetched: batch.len(),
        applied,
        skipped,
        checkpoint: processed.last().cloned(),
    })
}

fn failed_stage(e: &ReplicationError) -> &'static str {
    match e {
        ReplicationError::Fetch { .. } => "fetch",
        ReplicationError::Apply { .. } => "apply",
        ReplicationError::Checkpoint { .. } => "checkpoint",
        _ => "other",
    }
}
