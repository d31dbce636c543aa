//! Repository for the `jobs` table.
//!
//! Every mutation is a single statement or a single transaction scoped to
//! one job, and every mutation stamps `updated_at`. State changes are
//! conditional on the current state, so an illegal transition matches no
//! row and is reported instead of silently applied.

use std::time::Duration;

use sqlx::SqliteConnection;

use queuectl_core::retry::Transition;
use queuectl_core::scheduling::JobState;
use queuectl_core::types::{format_timestamp, Timestamp};

use crate::error::StoreError;
use crate::models::job::{Job, JobListQuery, NewJob, QueueMetrics, StateCounts};
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, command, state, attempts, max_retries, base_backoff, priority, \
    timeout_seconds, log_path, created_at, updated_at, available_at, \
    started_at, finished_at";

/// How many times [`JobRepo::claim_next`] re-selects after losing a race
/// before reporting an empty poll.
const MAX_CLAIM_ATTEMPTS: u32 = 5;

/// Pause between claim attempts after a conflict.
const CLAIM_CONFLICT_BACKOFF: Duration = Duration::from_millis(50);

/// Result of one pass of the claim transaction.
#[derive(Debug)]
enum ClaimAttempt {
    Claimed(Job),
    Empty,
    Conflict { id: String },
}

/// Provides the job store operations.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new pending job, overwriting any existing job with the same
    /// id (attempts, timestamps and state are reset).
    pub async fn insert(pool: &DbPool, job: &NewJob, now: Timestamp) -> Result<Job, StoreError> {
        let now = format_timestamp(now);
        let query = format!(
            "INSERT OR REPLACE INTO jobs \
                 (id, command, state, attempts, max_retries, base_backoff, priority, \
                  timeout_seconds, log_path, created_at, updated_at, available_at) \
             VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(&job.id)
            .bind(&job.command)
            .bind(JobState::Pending.as_str())
            .bind(job.max_retries)
            .bind(job.base_backoff)
            .bind(job.priority)
            .bind(job.timeout_seconds)
            .bind(&job.log_path)
            .bind(&now)
            .bind(&now)
            .bind(format_timestamp(job.available_at))
            .fetch_one(pool)
            .await?;
        Ok(job)
    }

    // -----------------------------------------------------------------------
    // Claim protocol
    // -----------------------------------------------------------------------

    /// Read the best eligible job without changing anything.
    ///
    /// Eligible means `pending` with `available_at <= now`. Ordered by
    /// `priority` descending, then `created_at` ascending.
    pub async fn select_candidate(
        conn: &mut SqliteConnection,
        now: Timestamp,
    ) -> Result<Option<Job>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE state = ? AND available_at <= ? \
             ORDER BY priority DESC, created_at ASC, rowid ASC \
             LIMIT 1"
        );
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(JobState::Pending.as_str())
            .bind(format_timestamp(now))
            .fetch_optional(conn)
            .await?;
        Ok(job)
    }

    /// Conditionally move job `id` from `pending` to `processing`.
    ///
    /// Returns `false` when the row is no longer pending at the moment of
    /// the write (another worker won the race).
    pub async fn try_claim(
        conn: &mut SqliteConnection,
        id: &str,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET state = ?, updated_at = ? \
             WHERE id = ? AND state = ?",
        )
        .bind(JobState::Processing.as_str())
        .bind(format_timestamp(now))
        .bind(id)
        .bind(JobState::Pending.as_str())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically pick the next eligible job and mark it `processing`.
    ///
    /// Runs select + conditional update inside `BEGIN IMMEDIATE`, which
    /// takes SQLite's write lock up front so concurrent claimers serialize.
    /// A lost race re-selects from scratch; after [`MAX_CLAIM_ATTEMPTS`]
    /// consecutive conflicts the poll is reported as empty.
    pub async fn claim_next(pool: &DbPool, now: Timestamp) -> Result<Option<Job>, StoreError> {
        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            match Self::claim_attempt(pool, now).await? {
                ClaimAttempt::Claimed(job) => return Ok(Some(job)),
                ClaimAttempt::Empty => return Ok(None),
                ClaimAttempt::Conflict { id } => {
                    tracing::debug!(job_id = %id, attempt, "Claim conflict, re-selecting");
                    tokio::time::sleep(CLAIM_CONFLICT_BACKOFF).await;
                }
            }
        }
        Ok(None)
    }

    /// One pass of the claim transaction.
    ///
    /// The transaction guard rolls back if this future is dropped before
    /// commit, so an aborted worker never leaves the write lock held.
    async fn claim_attempt(pool: &DbPool, now: Timestamp) -> Result<ClaimAttempt, StoreError> {
        let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;
        let attempt = Self::claim_in_transaction(&mut *tx, now).await?;
        match attempt {
            ClaimAttempt::Conflict { .. } => tx.rollback().await?,
            ClaimAttempt::Claimed(_) | ClaimAttempt::Empty => tx.commit().await?,
        }
        Ok(attempt)
    }

    async fn claim_in_transaction(
        conn: &mut SqliteConnection,
        now: Timestamp,
    ) -> Result<ClaimAttempt, StoreError> {
        let Some(candidate) = Self::select_candidate(conn, now).await? else {
            return Ok(ClaimAttempt::Empty);
        };

        if !Self::try_claim(conn, &candidate.id, now).await? {
            return Ok(ClaimAttempt::Conflict { id: candidate.id });
        }

        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?");
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(&candidate.id)
            .fetch_one(conn)
            .await?;
        Ok(ClaimAttempt::Claimed(job))
    }

    // -----------------------------------------------------------------------
    // Execution bookkeeping
    // -----------------------------------------------------------------------

    /// Record when execution of a claimed job began. Clears the previous
    /// attempt's `finished_at`.
    pub async fn record_start(pool: &DbPool, id: &str, at: Timestamp) -> Result<(), StoreError> {
        let at = format_timestamp(at);
        let result = sqlx::query(
            "UPDATE jobs SET started_at = ?, finished_at = NULL, updated_at = ? \
             WHERE id = ? AND state = ?",
        )
        .bind(&at)
        .bind(&at)
        .bind(id)
        .bind(JobState::Processing.as_str())
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotInState {
                id: id.to_string(),
                expected: JobState::Processing,
            });
        }
        Ok(())
    }

    /// Apply the retry policy's decision to a `processing` job.
    ///
    /// Rejected with [`StoreError::NotInState`] if the job is not
    /// `processing`.
    pub async fn record_outcome(
        pool: &DbPool,
        id: &str,
        transition: &Transition,
        finished_at: Timestamp,
    ) -> Result<Job, StoreError> {
        let (attempts, available_at) = match transition {
            Transition::Completed => (None, None),
            Transition::Retry {
                attempts,
                available_at,
                ..
            } => (Some(*attempts), Some(format_timestamp(*available_at))),
            Transition::Dead { attempts } => (Some(*attempts), None),
        };
        let finished_at = format_timestamp(finished_at);

        let query = format!(
            "UPDATE jobs \
             SET state = ?, \
                 attempts = COALESCE(?, attempts), \
                 available_at = COALESCE(?, available_at), \
                 finished_at = ?, \
                 updated_at = ? \
             WHERE id = ? AND state = ? \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(transition.state().as_str())
            .bind(attempts)
            .bind(available_at)
            .bind(&finished_at)
            .bind(&finished_at)
            .bind(id)
            .bind(JobState::Processing.as_str())
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| StoreError::NotInState {
                id: id.to_string(),
                expected: JobState::Processing,
            })
    }

    // -----------------------------------------------------------------------
    // Dead-letter queue
    // -----------------------------------------------------------------------

    /// Jobs in the `dead` state, oldest casualty first.
    pub async fn list_dead(pool: &DbPool) -> Result<Vec<Job>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE state = ? ORDER BY updated_at ASC, rowid ASC"
        );
        let jobs = sqlx::query_as::<_, Job>(&query)
            .bind(JobState::Dead.as_str())
            .fetch_all(pool)
            .await?;
        Ok(jobs)
    }

    /// Move a dead job back to `pending` with a fresh retry budget.
    ///
    /// Returns `false` (and changes nothing) if the job is not dead.
    pub async fn retry_dead(pool: &DbPool, id: &str, now: Timestamp) -> Result<bool, StoreError> {
        let now = format_timestamp(now);
        let result = sqlx::query(
            "UPDATE jobs \
             SET state = ?, attempts = 0, available_at = ?, \
                 started_at = NULL, finished_at = NULL, updated_at = ? \
             WHERE id = ? AND state = ?",
        )
        .bind(JobState::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .bind(id)
        .bind(JobState::Dead.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Read paths
    // -----------------------------------------------------------------------

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &DbPool, id: &str) -> Result<Option<Job>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?");
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(job)
    }

    /// List jobs ordered by creation time, optionally filtered by state.
    pub async fn list(pool: &DbPool, params: &JobListQuery) -> Result<Vec<Job>, StoreError> {
        let jobs = match params.state {
            Some(state) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM jobs WHERE state = ? \
                     ORDER BY created_at ASC, rowid ASC"
                );
                sqlx::query_as::<_, Job>(&query)
                    .bind(state.as_str())
                    .fetch_all(pool)
                    .await?
            }
            None => {
                let query =
                    format!("SELECT {COLUMNS} FROM jobs ORDER BY created_at ASC, rowid ASC");
                sqlx::query_as::<_, Job>(&query).fetch_all(pool).await?
            }
        };
        Ok(jobs)
    }

    /// Count jobs per state. States with no jobs report zero.
    pub async fn count_by_state(pool: &DbPool) -> Result<StateCounts, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(pool)
                .await?;

        let mut counts = StateCounts::default();
        for (state, count) in rows {
            match state.parse::<JobState>() {
                Ok(state) => counts.add(state, count),
                Err(e) => tracing::warn!(error = %e, count, "Skipping rows with unknown state"),
            }
        }
        Ok(counts)
    }

    /// Aggregate statistics over the whole table.
    pub async fn metrics(pool: &DbPool) -> Result<QueueMetrics, StoreError> {
        let (total, completed, dead, avg_attempts, avg_duration_secs): (
            i64,
            i64,
            i64,
            Option<f64>,
            Option<f64>,
        ) = sqlx::query_as(
            "SELECT \
                 COUNT(*), \
                 COALESCE(SUM(CASE WHEN state = 'completed' THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN state = 'dead' THEN 1 ELSE 0 END), 0), \
                 (SELECT AVG(attempts) FROM jobs WHERE attempts > 0), \
                 (SELECT AVG((julianday(finished_at) - julianday(started_at)) * 86400.0) \
                  FROM jobs WHERE started_at IS NOT NULL AND finished_at IS NOT NULL) \
             FROM jobs",
        )
        .fetch_one(pool)
        .await?;

        Ok(QueueMetrics {
            total,
            completed,
            dead,
            avg_attempts: avg_attempts.unwrap_or(0.0),
            avg_duration_secs: avg_duration_secs.unwrap_or(0.0),
        })
    }
}
