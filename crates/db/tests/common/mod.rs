//! Shared helpers for store integration tests.

#![allow(dead_code)]

use chrono::Utc;
use tempfile::TempDir;

use queuectl_core::types::Timestamp;
use queuectl_db::models::job::NewJob;
use queuectl_db::DbPool;

/// A migrated store on a file-backed SQLite database.
///
/// Keeps the temp directory alive for as long as the pool is in use.
pub struct TestStore {
    pub pool: DbPool,
    pub dir: TempDir,
}

pub async fn test_store() -> TestStore {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());
    let pool = queuectl_db::create_pool(&url)
        .await
        .expect("pool creation should succeed");
    queuectl_db::run_migrations(&pool)
        .await
        .expect("migrations should apply");
    TestStore { pool, dir }
}

/// A pending-job DTO eligible immediately.
pub fn new_job(id: &str, command: &str) -> NewJob {
    NewJob {
        id: id.to_string(),
        command: command.to_string(),
        max_retries: 3,
        base_backoff: 2.0,
        priority: 0,
        timeout_seconds: None,
        log_path: format!("logs/job_{id}.log"),
        available_at: Utc::now() - chrono::Duration::seconds(1),
    }
}

/// `base` shifted by `ms` milliseconds.
pub fn at(base: Timestamp, ms: i64) -> Timestamp {
    base + chrono::Duration::milliseconds(ms)
}
