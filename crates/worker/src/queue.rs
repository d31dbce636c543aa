//! Client-facing queue operations.
//!
//! [`Queue`] wraps the job store for front ends: enqueue, status, listing,
//! log tails, the dead-letter queue and store maintenance. Rendering the
//! results is left to the caller.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use queuectl_core::execution::job_log;
use queuectl_core::scheduling::JobState;
use queuectl_core::submission::{self, EnqueueRequest, JobDefaults};
use queuectl_core::types::JobId;
use queuectl_db::models::job::{Job, JobListQuery, NewJob, QueueMetrics, StateCounts};
use queuectl_db::repositories::JobRepo;
use queuectl_db::DbPool;

use crate::config::WorkerConfig;
use crate::error::QueueError;

/// The last lines of a job's log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogTail {
    pub path: PathBuf,
    /// `false` if the job is unknown or has not written a log yet.
    pub found: bool,
    pub lines: Vec<String>,
}

/// Handle to a job store plus the settings enqueue needs.
#[derive(Debug, Clone)]
pub struct Queue {
    pool: DbPool,
    defaults: JobDefaults,
    log_dir: PathBuf,
}

impl Queue {
    pub fn new(pool: DbPool, defaults: JobDefaults, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            defaults,
            log_dir: log_dir.into(),
        }
    }

    /// Open the store named by `config` and bring its schema up to date.
    pub async fn open(config: &WorkerConfig) -> Result<Self, QueueError> {
        let pool = queuectl_db::create_pool(&config.database_url).await?;
        queuectl_db::run_migrations(&pool).await?;
        tracing::info!(database_url = %config.database_url, "Job store ready");
        Ok(Self::new(pool, config.defaults, config.log_dir.clone()))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Validate and store a job. Returns its id.
    ///
    /// An existing job with the same id is overwritten.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<JobId, QueueError> {
        let now = Utc::now();
        let submission = submission::resolve(request, &self.defaults, now)?;
        let log_path = job_log::log_path_for(&self.log_dir, &submission.id)
            .to_string_lossy()
            .into_owned();

        let job = JobRepo::insert(&self.pool, &NewJob::from_submission(submission, log_path), now)
            .await?;
        tracing::info!(
            job_id = %job.id,
            priority = job.priority,
            max_retries = job.max_retries,
            available_at = %job.available_at,
            "Job enqueued"
        );
        Ok(job.id)
    }

    /// Enqueue from a JSON document such as `{"command":"echo hi"}`.
    pub async fn enqueue_json(&self, json: &str) -> Result<JobId, QueueError> {
        self.enqueue(EnqueueRequest::from_json(json)?).await
    }

    /// Job counts per state.
    pub async fn status(&self) -> Result<StateCounts, QueueError> {
        Ok(JobRepo::count_by_state(&self.pool).await?)
    }

    /// Jobs in creation order, optionally restricted to one state.
    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        Ok(JobRepo::list(&self.pool, &JobListQuery { state }).await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>, QueueError> {
        Ok(JobRepo::find_by_id(&self.pool, id).await?)
    }

    /// The log path of job `id` and its last `lines` lines.
    ///
    /// An unknown job, or one that has not produced a log yet, yields an
    /// empty tail with `found = false`.
    pub async fn logs(&self, id: &str, lines: usize) -> Result<LogTail, QueueError> {
        let Some(job) = self.get(id).await? else {
            tracing::debug!(job_id = id, "Log requested for unknown job");
            return Ok(LogTail {
                path: job_log::log_path_for(&self.log_dir, id),
                found: false,
                lines: Vec::new(),
            });
        };

        let path = PathBuf::from(&job.log_path);
        let tail = job_log::tail(&path, lines).await?;
        Ok(LogTail {
            path,
            found: tail.is_some(),
            lines: tail.unwrap_or_default(),
        })
    }

    /// Jobs in the dead-letter queue, oldest casualty first.
    pub async fn dlq_list(&self) -> Result<Vec<Job>, QueueError> {
        Ok(JobRepo::list_dead(&self.pool).await?)
    }

    /// Requeue a dead job with a fresh retry budget.
    ///
    /// Returns `false` and changes nothing if the job is not dead.
    pub async fn dlq_retry(&self, id: &str) -> Result<bool, QueueError> {
        let retried = JobRepo::retry_dead(&self.pool, id, Utc::now()).await?;
        if retried {
            tracing::info!(job_id = id, "Dead job requeued");
        } else {
            tracing::info!(job_id = id, "Job is not in the dead-letter queue, nothing to retry");
        }
        Ok(retried)
    }

    pub async fn metrics(&self) -> Result<QueueMetrics, QueueError> {
        Ok(JobRepo::metrics(&self.pool).await?)
    }

    /// Drop every job and recreate the schema. Workers must be stopped.
    pub async fn reinitialize(&self) -> Result<(), QueueError> {
        Ok(queuectl_db::reinitialize(&self.pool).await?)
    }
}
