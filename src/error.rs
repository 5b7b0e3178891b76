// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replicator.
//!
//! Errors are categorized by the replication stage that produced them.
//! The taxonomy matters because the loop treats them differently:
//!
//! | Error Type | Recoverable | Description |
//! |----------------|-------------|-------------|
//! | `Fetch` | Yes | Reading pending changes from the primary failed |
//! | `Apply` | Yes | Writing a change to the secondary failed |
//! | `Checkpoint` | Yes | Committing consumed sequences failed |
//! | `Connectivity` | No | A store was unreachable at construction |
//! | `Config` | No | Configuration invalid |
//! | `Sequence` | No | Sequence encoding does not match the backend |
//! | `InvalidState` | No | Lifecycle state machine violation |
//!
//! # Recovery Behavior
//!
//! Recoverable errors abort the current tick only: the loop records them in
//! the status registry and retries on the next tick. Re-fetching and
//! re-applying is safe because every apply is idempotent. Non-recoverable
//! errors indicate configuration problems or caller bugs and are surfaced
//! before the loop ever starts.

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Which of the two stores an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    /// The store changes are captured from.
    Primary,
    /// The store changes are applied to.
    Secondary,
}

impl std::fmt::Display for StoreRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreRole::Primary => write!(f, "primary"),
            StoreRole::Secondary => write!(f, "secondary"),
        }
    }
}

/// Errors that can occur during replication.
///
/// Use [`is_recoverable()`](Self::is_recoverable) to check whether the
/// operation may succeed on a later tick.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// A store was unreachable when the replicator was constructed.
    ///
    /// Fatal at startup: the process must not start the loop or the
    /// reporting surface without both stores verified reachable.
    #[error("{store} store unreachable: {source}")]
    Connectivity {
        store: StoreRole,
        #[source]
        source: sqlx::Error,
    },

    /// Invalid or missing configuration.
    ///
    /// Not recoverable. Fix the configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading a batch of pending changes from the primary failed.
    ///
    /// Recoverable. The tick is abandoned and the next tick re-fetches.
    #[error("fetch failed ({operation}): {message}")]
    Fetch {
        operation: String,
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Applying a change record to the secondary failed.
    ///
    /// Recoverable. The tick is abandoned; nothing from it is checkpointed,
    /// so the same records are re-applied next tick.
    #[error("apply failed ({operation}): {message}")]
    Apply {
        operation: String,
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Committing consumed sequences to the primary failed.
    ///
    /// Recoverable. The applied records are re-fetched and re-applied next
    /// tick, which is safe because applies are idempotent.
    #[error("checkpoint commit failed: {message}")]
    Checkpoint {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// A sequence value with the wrong encoding reached a backend.
    ///
    /// Not recoverable: a change-log source was handed a log position, or a
    /// capture-feed source an integer counter. Indicates a wiring bug.
    #[error("sequence encoding mismatch: {0}")]
    Sequence(String),

    /// Lifecycle state machine violation.
    ///
    /// Occurs when an operation is attempted in the wrong state
    /// (e.g., calling `start()` on an already-running replicator).
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl ReplicationError {
    /// Create a fetch error from a database error.
    pub fn fetch(operation: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Fetch {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a fetch error without a database source.
    pub fn fetch_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an apply error from a database error.
    pub fn apply(operation: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Apply {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create an apply error without a database source.
    pub fn apply_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Apply {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a checkpoint error from a database error.
    pub fn checkpoint(source: sqlx::Error) -> Self {
        Self::Checkpoint {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a checkpoint error without a database source.
    pub fn checkpoint_msg(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
            source: None,
        }
    }

    /// Check if the failed operation may succeed on a later tick.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch { .. } => true,
            Self::Apply { .. } => true,
            Self::Checkpoint { .. } => true,
            Self::Connectivity { .. } => false,
            Self::Config(_) => false,
            Self::Sequence(_) => false,
            Self::InvalidState { .. } => false,
        }
    }
}
