// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change sources: bounded reads of pending changes from the primary store.
//!
//! Two interchangeable backends produce the same abstract record shape and
//! the same ordering guarantee, so the loop and the applier stay
//! backend-agnostic:
//!
//! - [`ChangeLogSource`]: polls a trigger-maintained change-log table
//!   filtered by an unprocessed flag, ordered by auto-increment id.
//! - [`CaptureFeedSource`]: polls a native capture feed above a durable
//!   high-water-mark, ordered by binary log position.
//!
//! # Checkpoint Semantics
//!
//! `commit_checkpoint` durably marks sequences as consumed *in the primary
//! store itself*, so a restarted replicator resumes without re-sending
//! already-committed records. Committing is effectively idempotent:
//! re-committing an already-committed sequence is a no-op, because a retry
//! after partial failure may resubmit. A crash between apply and commit
//! re-delivers the affected records; that is the at-least-once contract.

mod capture_feed;
mod change_log;

pub use capture_feed::CaptureFeedSource;
pub use change_log::ChangeLogSource;

use crate::error::Result;
use crate::record::{ChangeRecord, Sequence};
use async_trait::async_trait;

/// A bounded reader of pending changes with durable checkpointing.
#[async_trait]
pub trait ChangeSource: Send + Sync + 'static {
    /// Fetch up to `limit` not-yet-checkpointed records, ascending by
    /// sequence.
    async fn fetch_batch(&self, limit: usize) -> Result<Vec<ChangeRecord>>;

    /// Durably mark the given sequences as consumed.
    ///
    /// Called only with sequences that were applied or deliberately skipped
    /// in the current tick. Must tolerate sequences that are already
    /// committed. An empty slice is a no-op.
    async fn commit_checkpoint(&self, sequences: &[Sequence]) -> Result<()>;
}
