//! SQLite-backed job store.
//!
//! Owns the connection pool, the versioned schema migrations and the
//! [`JobRepo`](repositories::JobRepo) that implements the claim protocol.

use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

pub mod error;
pub mod models;
pub mod repositories;

pub use error::StoreError;

pub type DbPool = sqlx::SqlitePool;

/// How long a connection waits on a locked database before reporting
/// `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on pooled connections. Each worker loop holds at most one
/// at a time, and only for the duration of a statement or claim.
const MAX_CONNECTIONS: u32 = 16;

/// Versioned schema migrations. Applied steps are recorded in
/// `_sqlx_migrations`, so running them again is a no-op.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Create a connection pool from a `sqlite://` URL.
///
/// The database file is created if missing. WAL journaling with
/// `synchronous = FULL` makes every acknowledged commit survive process
/// death.
pub async fn create_pool(database_url: &str) -> Result<DbPool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), StoreError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply any pending schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), StoreError> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

/// Destructive full wipe: drop every job and the migration ledger, then
/// recreate the schema from scratch.
///
/// Used by external reset/backup tooling. Workers must be stopped first;
/// the core does not coordinate with running loops.
pub async fn reinitialize(pool: &DbPool) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DROP TABLE IF EXISTS jobs")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS _sqlx_migrations")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    run_migrations(pool).await?;
    tracing::warn!("Job store reinitialized, all jobs removed");
    Ok(())
}
