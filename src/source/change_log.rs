// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change-log table source.
//!
//! Triggers on the replicated table append one row per mutation to a
//! `change_log` table; this source polls rows whose `processed` flag is
//! unset, ordered by the auto-incrementing id. Checkpointing sets the flag
//! for the consumed ids, which is naturally idempotent.
//!
//! The log row carries a full copy of the attribute columns at capture
//! time, so applying never needs to read the primary row again (which may
//! have changed since).

use crate::error::{ReplicationError, Result};
use crate::record::{ChangeRecord, Operation, RowAttributes, Sequence};
use crate::source::ChangeSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Row};
use tracing::debug;

/// Schema for the change-log table and the capture triggers.
///
/// Installed with `IF NOT EXISTS` so repeated startups are harmless. The
/// triggers copy the row image into the log at mutation time; deletes only
/// carry the key.
const INSTALL_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS change_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    op TEXT NOT NULL CHECK (op IN ('insert', 'update', 'delete')),
    entity_id INTEGER,
    name TEXT,
    email TEXT,
    created_at TEXT,
    updated_at TEXT,
    processed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS change_log_pending
    ON change_log (id) WHERE processed = 0;

CREATE TRIGGER IF NOT EXISTS users_capture_insert
AFTER INSERT ON users
BEGIN
    INSERT INTO change_log (op, entity_id, name, email, created_at, updated_at)
    VALUES ('insert', NEW.user_id, NEW.name, NEW.email, NEW.created_at, NEW.updated_at);
END;

CREATE TRIGGER IF NOT EXISTS users_capture_update
AFTER UPDATE ON users
BEGIN
    INSERT INTO change_log (op, entity_id, name, email, created_at, updated_at)
    VALUES ('update', NEW.user_id, NEW.name, NEW.email, NEW.created_at, NEW.updated_at);
END;

CREATE TRIGGER IF NOT EXISTS users_capture_delete
AFTER DELETE ON users
BEGIN
    INSERT INTO change_log (op, entity_id)
    VALUES ('delete', OLD.user_id);
END;
"#;

/// Source backed by a trigger-maintained change-log table on the primary.
pub struct ChangeLogSource {
    pool: SqlitePool,
}

impl ChangeLogSource {
    /// Create a source over an existing primary pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Install the change-log table and capture triggers on the primary.
    ///
    /// Requires the replicated `users` table to exist. Safe to call on
    /// every startup.
    pub async fn install(pool: &SqlitePool) -> Result<()> {
        sqlx::raw_sql(INSTALL_SQL)
            .execute(pool)
            .await
            .map_err(|e| ReplicationError::fetch("change_log install", e))?;
        debug!("Change-log table and triggers installed");
        Ok(())
    }

    /// Number of rows still awaiting checkpoint (for diagnostics).
    pub async fn pending_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM change_log WHERE processed = 0")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ReplicationError::fetch("change_log count", e))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| ReplicationError::fetch("change_log count", e))?;
        Ok(n as u64)
    }

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChangeRecord> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| ReplicationError::fetch("change_log decode", e))?;
        let op: String = row
            .try_get("op")
            .map_err(|e| ReplicationError::fetch("change_log decode", e))?;
        let operation = Operation::parse(&op).ok_or_else(|| {
            ReplicationError::fetch_msg("change_log decode", format!("unknown op '{}'", op))
        })?;
        let entity_id: Option<i64> = row
            .try_get("entity_id")
            .map_err(|e| ReplicationError::fetch("change_log decode", e))?;
        let name: Option<String> = row
            .try_get("name")
            .map_err(|e| ReplicationError::fetch("change_log decode", e))?;
        let email: Option<String> = row
            .try_get("email")
            .map_err(|e| ReplicationError::fetch("change_log decode", e))?;
        let created_at: Option<DateTime<Utc>> = row
            .try_get("created_at")
            .map_err(|e| ReplicationError::fetch("change_log decode", e))?;
        let updated_at: Option<DateTime<Utc>> = row
            .try_get("updated_at")
            .map_err(|e| ReplicationError::fetch("change_log decode", e))?;

        Ok(ChangeRecord {
            sequence: Sequence::Counter(id),
            operation,
            entity_id,
            attributes: RowAttributes {
                name,
                email,
                created_at,
                updated_at,
            },
        })
    }
}

#[async_trait]
impl ChangeSource for ChangeLogSource {
    async fn fetch_batch(&self, limit: usize) -> Result<Vec<ChangeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, op, entity_id, name, email, created_at, updated_at
            FROM change_log
            WHERE processed = 0
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReplicationError::fetch("change_log poll", e))?;

        rows.iter().map(Self::decode_row).collect()
    }

    async fn commit_checkpoint(&self, sequences: &[Sequence]) -> Result<()> {
        if sequences.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = sequences
            .iter()
            .map(|seq| {
                seq.as_counter().ok_or_else(|| {
                    ReplicationError::Sequence(format!(
                        "change-log source cannot commit {}",
                        seq
                    ))
                })
            })
            .collect::<Result<_>>()?;

        let mut builder = QueryBuilder::new("UPDATE change_log SET processed = 1 WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        builder.push(")");

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(ReplicationError::checkpoint)?;

        debug!(count = ids.len(), "Checkpointed change-log rows");
        Ok(())
    }
}
