//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Tick outcomes and durations
//! - Records fetched, applied, and skipped
//! - Checkpoint commits
//! - Loop lifecycle state
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replicator_` and follow Prometheus
//! conventions: counters end in `_total`, gauges represent current state,
//! histograms track distributions.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a completed tick.
pub fn record_tick(fetched: usize, applied: u64, skipped: u64, duration: Duration) {
    counter!("replicator_ticks_total", "outcome" => "success").increment(1);
    counter!("replicator_records_fetched_total").increment(fetched as u64);
    counter!("replicator_records_replicated_total").increment(applied);
    if skipped > 0 {
        counter!("replicator_records_skipped_total").increment(skipped);
    }
    histogram!("replicator_tick_duration_seconds").record(duration.as_secs_f64());
    histogram!("replicator_batch_size").record(fetched as f64);
}

/// Record a failed tick, labeled by the stage that failed.
pub fn record_tick_error(stage: &str) {
    counter!("replicator_ticks_total", "outcome" => "error").increment(1);
    counter!("replicator_tick_errors_total", "stage" => stage.to_string()).increment(1);
}

/// Record a checkpoint commit covering `count` sequences.
pub fn record_checkpoint_commit(count: usize) {
    counter!("replicator_checkpoint_commits_total").increment(1);
    counter!("replicator_checkpointed_sequences_total").increment(count as u64);
}

/// Gauge for loop lifecycle state.
pub fn set_loop_state(state: &str) {
    // Encode state as numeric for alerting (0=idle, 1=running, 2=stopped)
    let value = match state {
        "Idle" => 0.0,
        "Running" => 1.0,
        "Stopped" => 2.0,
        _ => -1.0,
    };
    gauge!("replicator_loop_state").set(value);
}
