// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared replication status.
//!
//! One [`ReplicationStatus`] instance exists per process. It is mutated
//! exclusively by the replication loop and read by the reporting surface,
//! so all access serializes through a single reader/writer lock: the loop
//! takes short write locks, `snapshot()` takes a read lock for the duration
//! of one clone and never observes a torn update.
//!
//! # Monotonicity
//!
//! `records_replicated`, `error_count`, and `last_checkpoint` never decrease
//! for the life of the process. The registry enforces the checkpoint bound
//! itself rather than trusting callers.

use crate::record::Sequence;
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tokio::sync::RwLock;

/// Point-in-time view of replication progress.
///
/// Serializes to the status document served by the reporting surface:
/// `last_lsn` (string, empty before the first checkpoint), `last_sync_time`
/// (ISO-8601 or null), `records_replicated`, `error_count`, `last_error`
/// (omitted when empty), `is_running`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicationStatus {
    /// Last sequence successfully applied and committed.
    pub last_checkpoint: Option<Sequence>,
    /// Wall-clock time of the last tick that processed at least one record.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Lifetime total of applied (non-skipped) records.
    pub records_replicated: u64,
    /// Lifetime total of failed ticks.
    pub error_count: u64,
    /// Message of the most recent failure; cleared by the next successful tick.
    pub last_error: Option<String>,
    /// True between start and stop.
    pub is_running: bool,
}

impl Serialize for ReplicationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = if self.last_error.is_some() { 6 } else { 5 };
        let mut state = serializer.serialize_struct("ReplicationStatus", fields)?;
        let lsn = self
            .last_checkpoint
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default();
        state.serialize_field("last_lsn", &lsn)?;
        state.serialize_field("last_sync_time", &self.last_sync_time)?;
        state.serialize_field("records_replicated", &self.records_replicated)?;
        state.serialize_field("error_count", &self.error_count)?;
        if let Some(ref err) = self.last_error {
            state.serialize_field("last_error", err)?;
        }
        state.serialize_field("is_running", &self.is_running)?;
        state.end()
    }
}

/// Thread-safe owner of the process-wide [`ReplicationStatus`].
#[derive(Debug, Default)]
pub struct StatusRegistry {
    inner: RwLock<ReplicationStatus>,
}

impl StatusRegistry {
    /// Create a registry with `is_running = false` and all counters zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Immutable copy of the current status.
    ///
    /// Holds the read lock only for the duration of the clone.
    pub async fn snapshot(&self) -> ReplicationStatus {
        self.inner.read().await.clone()
    }

    /// Flip the running flag at lifecycle transitions.
    pub(crate) async fn set_running(&self, running: bool) {
        self.inner.write().await.is_running = running;
    }

    /// Record a successful tick.
    ///
    /// `checkpoint` is the highest sequence committed this tick, present
    /// only when at least one record was processed. The checkpoint never
    /// moves backwards even if a caller hands in a stale sequence.
    pub(crate) async fn record_tick_success(&self, applied: u64, checkpoint: Option<Sequence>) {
        let mut status = self.inner.write().await;
        status.records_replicated += applied;
        if let Some(seq) = checkpoint {
            status.last_sync_time = Some(Utc::now());
            let advance = match status.last_checkpoint {
                Some(ref current) => seq > *current,
                None => true,
            };
            if advance {
                status.last_checkpoint = Some(seq);
            }
        }
        status.last_error = None;
    }

    /// Record a failed tick.
    pub(crate) async fn record_tick_error(&self, message: impl Into<String>) {
        let mut status = self.inner.write().await;
        status.error_count += 1;
        status.last_error = Some(message.into());
    }
}
