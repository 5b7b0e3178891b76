//! # Table Replicator
//!
//! A single-table, at-least-once change replicator. A timer-driven loop
//! detects mutations on a primary store and applies them idempotently to a
//! secondary store, exposing a thread-safe status snapshot over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          table-replicator                            │
//! │                                                                      │
//! │  ┌──────────────┐    ┌──────────────────┐    ┌────────────────────┐  │
//! │  │ ChangeSource │───►│ Replication Loop │───►│ ChangeApplier      │  │
//! │  │ (fetch batch)│    │ (tick: fetch →   │    │ (idempotent upsert │  │
//! │  └──────────────┘    │  apply → commit) │    │  / delete)         │  │
//! │         ▲            └──────────────────┘    └────────────────────┘  │
//! │         │                     │                                      │
//! │  checkpoint in                ▼                                      │
//! │  primary store       ┌────────────────┐      ┌────────────────────┐  │
//! │                      │ StatusRegistry │◄─────│ Reporting surface  │  │
//! │                      │ (RwLock)       │ read │ (/status, /health) │  │
//! │                      └────────────────┘      └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery Guarantee
//!
//! At-least-once: a crash between apply and checkpoint commit re-delivers
//! the affected records on restart. Applies are idempotent upserts and
//! deletes, so re-delivery never changes final state.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use table_replicator::{Replicator, ReplicatorConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ReplicatorConfig {
//!         primary_url: "sqlite://primary.db".into(),
//!         secondary_url: "sqlite://replica.db".into(),
//!         ..Default::default()
//!     };
//!
//!     let replicator = Replicator::connect(config).await.expect("stores unreachable");
//!     replicator.start().await.expect("failed to start");
//!
//!     // ... runs until stop
//!     replicator.stop().await;
//!     replicator.close().await;
//! }
//! ```

pub mod applier;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod record;
pub mod replicator;
pub mod source;
pub mod status;
pub mod store;

// Re-exports for convenience
pub use applier::{ChangeApplier, SqlApplier};
pub use config::{ReplicatorConfig, SourceKind};
pub use error::{ReplicationError, Result, StoreRole};
pub use record::{ChangeRecord, Operation, RowAttributes, Sequence, SkipReason};
pub use replicator::{Replicator, ReplicatorState, TickSummary};
pub use source::{CaptureFeedSource, ChangeLogSource, ChangeSource};
pub use status::{ReplicationStatus, StatusRegistry};
