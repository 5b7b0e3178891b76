// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change application against the secondary store.
//!
//! Every valid record becomes exactly one idempotent write:
//!
//! - Insert/Update → upsert keyed on the entity id. `created_at` is written
//!   only when the row is created (first-write-wins); `name`, `email`, and
//!   `updated_at` are overwritten with the incoming values.
//! - Delete → delete keyed on the entity id; deleting a missing key
//!   succeeds.
//!
//! Idempotence is what makes at-least-once delivery safe: a record
//! re-applied after a crash or a failed checkpoint commit leaves the
//! secondary in the same state as applying it once.

use crate::error::{ReplicationError, Result};
use crate::record::{ChangeRecord, Operation};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use tracing::trace;

/// Applies one change record to the secondary store.
///
/// A trait so tests can substitute a recording or failing applier; the
/// loop only sees this seam.
#[async_trait]
pub trait ChangeApplier: Send + Sync + 'static {
    /// Apply one record. Callers must filter skippable records first
    /// (see [`ChangeRecord::check_applicable`]); a record without an
    /// entity id is a caller bug here, not a skip.
    async fn apply(&self, record: &ChangeRecord) -> Result<()>;
}

/// SQL applier for the replicated `users` table.
pub struct SqlApplier {
    pool: SqlitePool,
}

impl SqlApplier {
    /// Create an applier over an existing secondary pool.
    ///
    /// The replicated table is installed at construction time by
    /// [`store::ensure_users_table`](crate::store::ensure_users_table).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, record: &ChangeRecord, entity_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, name, email, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(entity_id)
        .bind(&record.attributes.name)
        .bind(&record.attributes.email)
        .bind(record.attributes.created_at)
        .bind(record.attributes.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ReplicationError::apply("upsert", e))?;

        trace!(entity_id, op = %record.operation, "Upserted row");
        Ok(())
    }

    async fn delete(&self, entity_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .map_err(|e| ReplicationError::apply("delete", e))?;

        trace!(entity_id, "Deleted row");
        Ok(())
    }
}

#[async_trait]
impl ChangeApplier for SqlApplier {
    async fn apply(&self, record: &ChangeRecord) -> Result<()> {
        let entity_id = record
            .entity_id
            .ok_or_else(|| ReplicationError::apply_msg("dispatch", "record has no entity id"))?;

        match record.operation {
            Operation::Insert | Operation::Update => self.upsert(record, entity_id).await,
            Operation::Delete => self.delete(entity_id).await,
        }
    }
}
