//! Loop lifecycle types.
//!
//! # State Transitions
//!
//! ```text
//!            start()                stop()
//! Idle ──────────────→ Running ──────────────→ Stopped
//!  │                                              ↑
//!  └──────────────────────────────────────────────┘
//!                 stop() before start()
//! ```
//!
//! # State Descriptions
//!
//! - **Idle**: constructed, stores verified reachable, not ticking.
//! - **Running**: the tick task is scheduled; `is_running` is true.
//! - **Stopped**: terminal. The stop signal was observed at a tick
//!   boundary and the task has exited. A stopped replicator is not
//!   restartable; construct a new one.
//!
//! Errors never change the state: a failed tick is recorded in the status
//! registry and the loop keeps ticking until an explicit stop.

use crate::record::Sequence;

/// State of the replication loop.
///
/// See module docs for the transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicatorState {
    /// Constructed but not started.
    Idle,
    /// Ticking on the poll interval.
    Running,
    /// Terminal: cancellation observed, loop exited.
    Stopped,
}

impl std::fmt::Display for ReplicatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicatorState::Idle => write!(f, "Idle"),
            ReplicatorState::Running => write!(f, "Running"),
            ReplicatorState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Outcome of one completed tick.
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    /// Records fetched from the source this tick.
    pub fetched: usize,
    /// Records applied to the secondary (excludes skips).
    pub applied: u64,
    /// Malformed records skipped but still checkpointed.
    pub skipped: u64,
    /// Highest sequence committed this tick, if any record was processed.
    pub checkpoint: Option<Sequence>,
}

impl TickSummary {
    /// True when the tick found no pending changes.
    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ReplicatorState::Idle.to_string(), "Idle");
        assert_eq!(ReplicatorState::Running.to_string(), "Running");
        assert_eq!(ReplicatorState::Stopped.to_string(), "Stopped");
    }

    #[test]
    fn test_state_equality() {
        assert_eq!(ReplicatorState::Idle, ReplicatorState::Idle);
        assert_ne!(ReplicatorState::Idle, ReplicatorState::Running);
    }

    #[test]
    fn test_summary_is_empty() {
        assert!(TickSummary::default().is_empty());

        let summary = TickSummary {
            fetched: 3,
            applied: 2,
            skipped: 1,
            checkpoint: Some(Sequence::Counter(3)),
        };
        assert!(!summary.is_empty());
    }
}
