//! Shared fixtures for integration tests.
//!
//! Stores are temp-file SQLite databases (WAL mode), so every test gets a
//! real primary/secondary pair with no external services. Fault injection
//! wrappers delegate to real sources/appliers so outage scenarios still
//! exercise the production SQL paths.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::sync::atomic::{AtomicUsize, Ordering};
use table_replicator::{
    ChangeApplier, ChangeRecord, ChangeSource, ReplicationError, Result, Sequence, StoreRole,
};

/// A temp-backed primary/secondary store pair.
///
/// Hold on to this for the duration of the test; dropping it deletes the
/// databases.
pub struct TestStores {
    pub dir: tempfile::TempDir,
    pub primary: SqlitePool,
    pub secondary: SqlitePool,
}

impl TestStores {
    pub fn primary_url(&self) -> String {
        format!("sqlite://{}", self.dir.path().join("primary.db").display())
    }

    pub fn secondary_url(&self) -> String {
        format!("sqlite://{}", self.dir.path().join("secondary.db").display())
    }
}

/// Open both stores with the replicated table installed on each.
pub async fn test_stores() -> TestStores {
    let dir = tempfile::tempdir().unwrap();
    let primary_url = format!("sqlite://{}", dir.path().join("primary.db").display());
    let secondary_url = format!("sqlite://{}", dir.path().join("secondary.db").display());

    let primary = table_replicator::store::connect(&primary_url, StoreRole::Primary)
        .await
        .unwrap();
    let secondary = table_replicator::store::connect(&secondary_url, StoreRole::Secondary)
        .await
        .unwrap();

    table_replicator::store::ensure_users_table(&primary, StoreRole::Primary)
        .await
        .unwrap();
    table_replicator::store::ensure_users_table(&secondary, StoreRole::Secondary)
        .await
        .unwrap();

    TestStores {
        dir,
        primary,
        secondary,
    }
}

/// Insert a user on the primary (fires the capture triggers if installed).
pub async fn insert_user(pool: &SqlitePool, id: i64, name: &str, email: &str) {
    sqlx::query(
        "INSERT INTO users (user_id, name, email, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(email)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap();
}

/// Update a user's email on the primary.
pub async fn update_user_email(pool: &SqlitePool, id: i64, email: &str) {
    sqlx::query("UPDATE users SET email = ?, updated_at = ? WHERE user_id = ?")
        .bind(email)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

/// Delete a user on the primary.
pub async fn delete_user(pool: &SqlitePool, id: i64) {
    sqlx::query("DELETE FROM users WHERE user_id = ?")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

/// Seed one capture-feed row directly.
pub async fn seed_feed_row(
    pool: &SqlitePool,
    position: &[u8],
    code: i64,
    entity_id: Option<i64>,
    email: &str,
) {
    sqlx::query(
        "INSERT INTO capture_feed (position, op, entity_id, name, email, created_at, updated_at)
         VALUES (?, ?, ?, 'user', ?, ?, ?)",
    )
    .bind(position)
    .bind(code)
    .bind(entity_id)
    .bind(email)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap();
}

/// Email of a secondary row, or `None` if the row does not exist.
pub async fn secondary_email(pool: &SqlitePool, id: i64) -> Option<Option<String>> {
    sqlx::query("SELECT email FROM users WHERE user_id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .unwrap()
        .map(|row| row.try_get("email").unwrap())
}

/// Number of rows on the secondary.
pub async fn secondary_count(pool: &SqlitePool) -> i64 {
    sqlx::query("SELECT COUNT(*) AS n FROM users")
        .fetch_one(pool)
        .await
        .unwrap()
        .try_get("n")
        .unwrap()
}

/// Source wrapper that fails the next N checkpoint commits, then delegates.
pub struct CommitOutage<S> {
    inner: S,
    failures: AtomicUsize,
}

impl<S> CommitOutage<S> {
    pub fn new(inner: S, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl<S: ChangeSource> ChangeSource for CommitOutage<S> {
    async fn fetch_batch(&self, limit: usize) -> Result<Vec<ChangeRecord>> {
        self.inner.fetch_batch(limit).await
    }

    async fn commit_checkpoint(&self, sequences: &[Sequence]) -> Result<()> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ReplicationError::checkpoint_msg("injected commit outage"));
        }
        self.inner.commit_checkpoint(sequences).await
    }
}

/// Applier wrapper that fails the next N applies, then delegates.
pub struct ApplyOutage<A> {
    inner: A,
    failures: AtomicUsize,
}

impl<A> ApplyOutage<A> {
    pub fn new(inner: A, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl<A: ChangeApplier> ChangeApplier for ApplyOutage<A> {
    async fn apply(&self, record: &ChangeRecord) -> Result<()> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ReplicationError::apply_msg(
                "upsert",
                "injected secondary outage",
            ));
        }
        self.inner.apply(record).await
    }
}
