// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change record model.
//!
//! A [`ChangeRecord`] is one captured mutation on the primary store: an
//! operation kind, the affected entity id, the row attributes, and an opaque
//! ordering marker. Records are produced by the primary store's own change
//! tracking (trigger-appended log rows or a native capture feed), read once
//! by a change source, and never mutated here.
//!
//! # Sequence Encodings
//!
//! The two source backends use different ordering markers:
//! - the change-log table orders by an auto-incrementing integer id
//! - the capture feed orders by a binary log position
//!
//! Both are total orders and both are monotonically non-decreasing, so the
//! loop and the status registry treat them through one [`Sequence`] type.
//!
//! # Missing vs. Empty
//!
//! Attribute fields are explicit `Option`s rather than sentinel values, so
//! "column was NULL" and "column absent from the capture row" are the same
//! unambiguous `None` at the applier boundary.

use chrono::{DateTime, Utc};

/// Opaque, totally ordered marker used for ordering and checkpointing.
///
/// Within one backend all sequences use the same variant; the derived
/// ordering is only meaningful between sequences of the same variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sequence {
    /// Auto-incrementing change-log row id.
    Counter(i64),
    /// Binary log position from a native capture feed.
    LogPosition(Vec<u8>),
}

impl Sequence {
    /// The integer counter, if this is a change-log sequence.
    pub fn as_counter(&self) -> Option<i64> {
        match self {
            Sequence::Counter(n) => Some(*n),
            Sequence::LogPosition(_) => None,
        }
    }

    /// The raw log position bytes, if this is a capture-feed sequence.
    pub fn as_log_position(&self) -> Option<&[u8]> {
        match self {
            Sequence::Counter(_) => None,
            Sequence::LogPosition(p) => Some(p),
        }
    }
}

/// Wire encoding for the status document: decimal for counters, lowercase
/// hex for log positions.
impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sequence::Counter(n) => write!(f, "{}", n),
            Sequence::LogPosition(p) => {
                for byte in p {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Kind of captured mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// Parse the textual form used by the change-log table.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "insert" => Some(Operation::Insert),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }

    /// Decode a capture-feed operation code.
    ///
    /// Feed codes: 1 = delete, 2 = insert, 4 = after-update. Code 3 is the
    /// before-update image and carries no applicable change; it is never
    /// surfaced as a record.
    pub fn from_capture_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Operation::Delete),
            2 => Some(Operation::Insert),
            4 => Some(Operation::Update),
            _ => None,
        }
    }

    /// Check if this operation writes row attributes (as opposed to
    /// removing the row).
    pub fn is_upsert(&self) -> bool {
        matches!(self, Operation::Insert | Operation::Update)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Nullable row attributes of the replicated table.
///
/// `created_at` is immutable on the secondary: it is written on row
/// creation and never overwritten by a later update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowAttributes {
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RowAttributes {
    /// True when every attribute is absent.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.created_at.is_none()
            && self.updated_at.is_none()
    }
}

/// Why a record was skipped instead of applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The capture row carried no entity id.
    MissingEntityId,
    /// An insert/update carried no attributes at all.
    EmptyAttributes,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingEntityId => write!(f, "missing entity id"),
            SkipReason::EmptyAttributes => write!(f, "empty attributes"),
        }
    }
}

/// One captured mutation on the primary store.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    /// Ordering and checkpoint marker; non-decreasing within a batch.
    pub sequence: Sequence,
    /// Operation kind.
    pub operation: Operation,
    /// Primary key of the affected row. `None` marks a malformed capture
    /// row, which is skipped but still checkpointed.
    pub entity_id: Option<i64>,
    /// Row attributes carried by the capture row. Empty for deletes.
    pub attributes: RowAttributes,
}

impl ChangeRecord {
    /// Classify this record as applicable or skippable.
    ///
    /// Malformed capture rows must not block the pipeline: a skippable
    /// record is not applied and not counted as replicated, but it is still
    /// checkpointed so it is never fetched again.
    pub fn check_applicable(&self) -> Option<SkipReason> {
        if self.entity_id.is_none() {
            return Some(SkipReason::MissingEntityId);
        }
        if self.operation.is_upsert() && self.attributes.is_empty() {
            return Some(SkipReason::EmptyAttributes);
        }
        None
    }
}
