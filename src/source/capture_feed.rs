// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Native capture feed source.
//!
//! Some primaries expose change capture as a feed of rows keyed by a binary
//! log position rather than a trigger-maintained table. This source polls
//! the feed bounded below by a durable high-water-mark, ordered by log
//! position, and checkpoints by advancing the watermark.
//!
//! # Feed Operation Codes
//!
//! The feed uses numeric operation codes: 1 = delete, 2 = insert,
//! 3 = before-update image, 4 = after-update. Before-images carry no
//! applicable change and are filtered out at the query; the watermark
//! still moves past them because positions are strictly ordered and the
//! watermark is the max *committed* position.
//!
//! # Watermark Semantics
//!
//! The watermark is stored in the primary itself (`capture_watermark`),
//! never in replicator memory, so a restarted process resumes where it
//! left off. Advancing is monotonic: committing an older position than the
//! stored one is a no-op, which makes re-commits after partial failure
//! harmless.

use crate::error::{ReplicationError, Result};
use crate::record::{ChangeRecord, Operation, RowAttributes, Sequence};
use crate::source::ChangeSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;

/// Name of the single replicated feed.
const FEED_NAME: &str = "users";

const INSTALL_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS capture_feed (
    position BLOB PRIMARY KEY,
    op INTEGER NOT NULL,
    entity_id INTEGER,
    name TEXT,
    email TEXT,
    created_at TEXT,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS capture_watermark (
    feed TEXT PRIMARY KEY,
    position BLOB NOT NULL
);
"#;

/// Source backed by a log-position-ordered capture feed on the primary.
pub struct CaptureFeedSource {
    pool: SqlitePool,
}

impl CaptureFeedSource {
    /// Create a source over an existing primary pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Install the feed and watermark tables. Safe to call on every startup.
    pub async fn install(pool: &SqlitePool) -> Result<()> {
        sqlx::raw_sql(INSTALL_SQL)
            .execute(pool)
            .await
            .map_err(|e| ReplicationError::fetch("capture_feed install", e))?;
        debug!("Capture feed tables installed");
        Ok(())
    }

    /// Current high-water-mark, if any commit has happened yet.
    pub async fn watermark(&self) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT position FROM capture_watermark WHERE feed = ?")
            .bind(FEED_NAME)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ReplicationError::fetch("watermark read", e))?;

        match row {
            Some(row) => {
                let position: Vec<u8> = row
                    .try_get("position")
                    .map_err(|e| ReplicationError::fetch("watermark read", e))?;
                Ok(Some(position))
            }
            None => Ok(None),
        }
    }

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChangeRecord> {
        let position: Vec<u8> = row
            .try_get("position")
            .map_err(|e| ReplicationError::fetch("capture_feed decode", e))?;
        let code: i64 = row
            .try_get("op")
            .map_err(|e| ReplicationError::fetch("capture_feed decode", e))?;
        let operation = Operation::from_capture_code(code).ok_or_else(|| {
            ReplicationError::fetch_msg(
                "capture_feed decode",
                format!("unexpected operation code {}", code),
            )
        })?;
        let entity_id: Option<i64> = row
            .try_get("entity_id")
            .map_err(|e| ReplicationError::fetch("capture_feed decode", e))?;
        let name: Option<String> = row
            .try_get("name")
            .map_err(|e| ReplicationError::fetch("capture_feed decode", e))?;
        let email: Option<String> = row
            .try_get("email")
            .map_err(|e| ReplicationError::fetch("capture_feed decode", e))?;
        let created_at: Option<DateTime<Utc>> = row
            .try_get("created_at")
            .map_err(|e| ReplicationError::fetch("capture_feed decode", e))?;
        let updated_at: Option<DateTime<Utc>> = row
            .try_get("updated_at")
            .map_err(|e| ReplicationError::fetch("capture_feed decode", e))?;

        Ok(ChangeRecord {
            sequence: Sequence::LogPosition(position),
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
impl ChangeSource for CaptureFeedSource {
    async fn fetch_batch(&self, limit: usize) -> Result<Vec<ChangeRecord>> {
        let watermark = self.watermark().await?;

        let rows = sqlx::query(
            r#"
            SELECT position, op, entity_id, name, email, created_at, updated_at
            FROM capture_feed
            WHERE op IN (1, 2, 4) AND (?1 IS NULL OR position > ?1)
            ORDER BY position ASC
            LIMIT ?2
            "#,
        )
        .bind(watermark)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReplicationError::fetch("capture_feed poll", e))?;

        rows.iter().map(Self::decode_row).collect()
    }

    async fn commit_checkpoint(&self, sequences: &[Sequence]) -> Result<()> {
        if sequences.is_empty() {
            return Ok(());
        }

        let positions = sequences
            .iter()
            .map(|seq| {
                seq.as_log_position().map(<[u8]>::to_vec).ok_or_else(|| {
                    ReplicationError::Sequence(format!(
                        "capture-feed source cannot commit {}",
                        seq
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let Some(max_position) = positions.into_iter().max() else {
            return Ok(());
        };

        // Monotonic advance: re-committing an older position is a no-op
        sqlx::query(
            r#"
            INSERT INTO capture_watermark (feed, position)
            VALUES (?1, ?2)
            ON CONFLICT(feed) DO UPDATE SET position = excluded.position
            WHERE excluded.position > capture_watermark.position
            "#,
        )
        .bind(FEED_NAME)
        .bind(&max_position)
        .execute(&self.pool)
        .await
        .map_err(ReplicationError::checkpoint)?;

        debug!(watermark = %Sequence::LogPosition(max_position), "Advanced capture watermark");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn feed_pool(dir: &tempfile::TempDir) -> SqlitePool {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("feed.db").display());
        let pool = SqlitePool::connect(&url).await.unwrap();
        CaptureFeedSource::install(&pool).await.unwrap();
        pool
    }

    async fn seed_feed_row(pool: &SqlitePool, position: &[u8], code: i64, entity_id: Option<i64>) {
        sqlx::query(
            "INSERT INTO capture_feed (position, op, entity_id, name, email, created_at, updated_at)
             VALUES (?, ?, ?, 'n', 'e@example.com', ?, ?)",
        )
        .bind(position)
        .bind(code)
        .bind(entity_id)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_orders_by_position() {
        let dir = tempdir().unwrap();
        let pool = feed_pool(&dir).await;
        let source = CaptureFeedSource::new(pool.clone());

        // Insert out of order; fetch must sort by position bytes
        seed_feed_row(&pool, &[0x00, 0x03], 2, Some(3)).await;
        seed_feed_row(&pool, &[0x00, 0x01], 2, Some(1)).await;
        seed_feed_row(&pool, &[0x00, 0x02], 2, Some(2)).await;

        let batch = source.fetch_batch(100).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].entity_id, Some(1));
        assert_eq!(batch[1].entity_id, Some(2));
        assert_eq!(batch[2].entity_id, Some(3));
        assert!(batch[0].sequence < batch[1].sequence);
        assert!(batch[1].sequence < batch[2].sequence);

        pool.close().await;
    }

    #[tokio::test]
    async fn test_before_update_images_are_filtered() {
        let dir = tempdir().unwrap();
        let pool = feed_pool(&dir).await;
        let source = CaptureFeedSource::new(pool.clone());

        seed_feed_row(&pool, &[0x01], 3, Some(1)).await; // before-image
        seed_feed_row(&pool, &[0x02], 4, Some(1)).await; // after-update

        let batch = source.fetch_batch(100).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].operation, Operation::Update);
        assert_eq!(batch[0].sequence, Sequence::LogPosition(vec![0x02]));

        pool.close().await;
    }

    #[tokio::test]
    async fn test_operation_code_decoding() {
        let dir = tempdir().unwrap();
        let pool = feed_pool(&dir).await;
        let source = CaptureFeedSource::new(pool.clone());

        seed_feed_row(&pool, &[0x01], 2, Some(1)).await;
        seed_feed_row(&pool, &[0x02], 4, Some(1)).await;
        seed_feed_row(&pool, &[0x03], 1, Some(1)).await;

        let batch = source.fetch_batch(100).await.unwrap();
        assert_eq!(batch[0].operation, Operation::Insert);
        assert_eq!(batch[1].operation, Operation::Update);
        assert_eq!(batch[2].operation, Operation::Delete);

        pool.close().await;
    }

    #[tokio::test]
    async fn test_commit_advances_watermark_and_bounds_fetch() {
        let dir = tempdir().unwrap();
        let pool = feed_pool(&dir).await;
        let source = CaptureFeedSource::new(pool.clone());

        seed_feed_row(&pool, &[0x01], 2, Some(1)).await;
        seed_feed_row(&pool, &[0x02], 2, Some(2)).await;

        let batch = source.fetch_batch(100).await.unwrap();
        let sequences: Vec<Sequence> = batch.iter().map(|r| r.sequence.clone()).collect();
        source.commit_checkpoint(&sequences).await.unwrap();

        assert_eq!(source.watermark().await.unwrap(), Some(vec![0x02]));
        assert!(source.fetch_batch(100).await.unwrap().is_empty());

        // New rows above the watermark are visible again
        seed_feed_row(&pool, &[0x03], 2, Some(3)).await;
        let batch = source.fetch_batch(100).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].entity_id, Some(3));

        pool.close().await;
    }

    #[tokio::test]
    async fn test_commit_never_moves_watermark_backwards() {
        let dir = tempdir().unwrap();
        let pool = feed_pool(&dir).await;
        let source = CaptureFeedSource::new(pool.clone());

        source
            .commit_checkpoint(&[Sequence::LogPosition(vec![0x05])])
            .await
            .unwrap();
        source
            .commit_checkpoint(&[Sequence::LogPosition(vec![0x02])])
            .await
            .unwrap();

        assert_eq!(source.watermark().await.unwrap(), Some(vec![0x05]));
        pool.close().await;
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let dir = tempdir().unwrap();
        let pool = feed_pool(&dir).await;
        let source = CaptureFeedSource::new(pool.clone());

        let sequences = [Sequence::LogPosition(vec![0x04])];
        source.commit_checkpoint(&sequences).await.unwrap();
        source.commit_checkpoint(&sequences).await.unwrap();

        assert_eq!(source.watermark().await.unwrap(), Some(vec![0x04]));
        pool.close().await;
    }

    #[tokio::test]
    async fn test_commit_rejects_counter_sequences() {
        let dir = tempdir().unwrap();
        let pool = feed_pool(&dir).await;
        let source = CaptureFeedSource::new(pool.clone());

        let result = source.commit_checkpoint(&[Sequence::Counter(1)]).await;
        assert!(matches!(result, Err(ReplicationError::Sequence(_))));

        pool.close().await;
    }

    #[tokio::test]
    async fn test_fetch_respects_limit() {
        let dir = tempdir().unwrap();
        let pool = feed_pool(&dir).await;
        let source = CaptureFeedSource::new(pool.clone());

        for i in 1u8..=8 {
            seed_feed_row(&pool, &[0x00, i], 2, Some(i as i64)).await;
        }

        let batch = source.fetch_batch(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[2].entity_id, Some(3));

        pool.close().await;
    }
}
