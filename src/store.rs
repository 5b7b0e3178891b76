// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store connection pools.
//!
//! Both stores are opened once at construction and the pools are held for
//! the process lifetime; they are safe for concurrent use by the loop and
//! any ad hoc diagnostic calls.
//!
//! Reachability is verified with a ping before the replicator is allowed
//! to exist: a process that cannot reach either store must fail at startup
//! rather than tick against a dead connection.

use crate::error::{ReplicationError, Result, StoreRole};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

/// Open a pool for one store and verify it is reachable.
///
/// SQLite is opened in WAL mode with a small pool; connections are cheap
/// and the loop uses at most one at a time.
pub async fn connect(url: &str, role: StoreRole) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| ReplicationError::Config(format!("invalid {} URL: {}", role, e)))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(|source| ReplicationError::Connectivity { store: role, source })?;

    ping(&pool, role).await?;
    info!(store = %role, "Connected and verified store");
    Ok(pool)
}

/// Verify a store answers a trivial query.
pub async fn ping(pool: &SqlitePool, role: StoreRole) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|source| ReplicationError::Connectivity { store: role, source })
}

/// Schema of the replicated table, shared by both stores.
const USERS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    name TEXT,
    email TEXT,
    created_at TEXT,
    updated_at TEXT
);
"#;

/// Ensure the replicated `users` table exists on a store.
///
/// A store that cannot run DDL at startup is as unusable as an
/// unreachable one, so failures map to connectivity errors.
pub async fn ensure_users_table(pool: &SqlitePool, role: StoreRole) -> Result<()> {
    sqlx::raw_sql(USERS_TABLE_SQL)
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|source| ReplicationError::Connectivity { store: role, source })
}
