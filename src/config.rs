//! Configuration for the replicator.
//!
//! Configuration is passed to [`Replicator::new()`](crate::Replicator::new)
//! and can be constructed programmatically, parsed from CLI flags, or
//! deserialized from JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use table_replicator::config::{ReplicatorConfig, SourceKind};
//!
//! let config = ReplicatorConfig {
//!     primary_url: "sqlite:///var/lib/replicator/primary.db".into(),
//!     secondary_url: "sqlite:///var/lib/replicator/replica.db".into(),
//!     source: SourceKind::ChangeLog,
//!     ..Default::default()
//! };
//! assert_eq!(config.batch_size, 100);
//! ```

use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Which change-capture backend to poll on the primary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Trigger-maintained change-log table with an unprocessed flag,
    /// ordered by auto-increment id.
    ChangeLog,
    /// Native capture feed bounded by a durable high-water-mark, ordered
    /// by binary log position.
    CaptureFeed,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::ChangeLog => write!(f, "change_log"),
            SourceKind::CaptureFeed => write!(f, "capture_feed"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "change_log" | "change-log" => Ok(SourceKind::ChangeLog),
            "capture_feed" | "capture-feed" => Ok(SourceKind::CaptureFeed),
            other => Err(ReplicationError::Config(format!(
                "unknown source kind '{}' (expected change_log or capture_feed)",
                other
            ))),
        }
    }
}

/// Top-level replicator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    /// Connection URL of the primary store (changes are captured here).
    pub primary_url: String,

    /// Connection URL of the secondary store (changes are applied here).
    pub secondary_url: String,

    /// Change-capture backend on the primary.
    #[serde(default = "default_source")]
    pub source: SourceKind,

    /// Poll interval as a duration string (e.g., "5s").
    /// Parsed to `Duration` internally.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Maximum change records fetched per tick. Bounds per-tick work and
    /// the memory held by one batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Listen address for the status/health reporting surface.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_source() -> SourceKind {
    SourceKind::ChangeLog
}

fn default_poll_interval() -> String {
    "5s".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            primary_url: String::new(),
            secondary_url: String::new(),
            source: SourceKind::ChangeLog,
            poll_interval: "5s".to_string(),
            batch_size: 100,
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ReplicatorConfig {
    /// Parse the poll_interval string to a Duration.
    pub fn poll_interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(5))
    }

    /// Validate fields that cannot be checked at parse time.
    pub fn validate(&self) -> Result<()> {
        if self.primary_url.is_empty() {
            return Err(ReplicationError::Config("primary URL is empty".to_string()));
        }
        if self.secondary_url.is_empty() {
            return Err(ReplicationError::Config(
                "secondary URL is empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ReplicationError::Config(
                "batch size must be at least 1".to_string(),
            ));
        }
        if humantime::parse_duration(&self.poll_interval).is_err() {
            return Err(ReplicationError::Config(format!(
                "invalid poll interval '{}'",
                self.poll_interval
            )));
        }
        Ok(())
    }

    /// Create a config for tests, pointing at the given store URLs with a
    /// fast poll interval.
    pub fn for_testing(primary_url: &str, secondary_url: &str) -> Self {
        Self {
            primary_url: primary_url.to_string(),
            secondary_url: secondary_url.to_string(),
            source: SourceKind::ChangeLog,
            poll_interval: "50ms".to_string(),
            batch_size: 100,
            listen_addr: "127.0.0.1:0".to_string(),
        }
    }
}
