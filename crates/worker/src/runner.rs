//! The worker loop: claim, execute, apply outcome, repeat.
//!
//! Each loop is single-threaded with respect to its own job. Loops never
//! coordinate with each other directly; the store's claim transaction is
//! the only point of contention.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use queuectl_core::execution::JobExecutor;
use queuectl_core::retry::Transition;
use queuectl_core::scheduling::{state_machine, JobState};
use queuectl_db::models::job::Job;
use queuectl_db::repositories::JobRepo;
use queuectl_db::{DbPool, StoreError};

use crate::error::QueueError;

/// Pause before retrying a store operation that failed transiently.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Poll timing for a worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Sleep between polls that found no eligible job.
    pub poll_interval: Duration,
    /// Consecutive idle time after which the loop exits. `None` runs until
    /// stopped.
    pub idle_timeout: Option<Duration>,
}

/// Why a worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// No eligible job appeared within the idle timeout.
    Idle,
    /// The stop signal was observed at a poll boundary.
    Stopped,
    /// The task was aborted, possibly mid-job.
    Aborted,
    /// A non-transient store failure ended the loop.
    Failed(String),
}

/// One worker loop bound to a store.
#[derive(Debug, Clone)]
pub struct Worker {
    id: usize,
    pool: DbPool,
    executor: JobExecutor,
    settings: WorkerSettings,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        id: usize,
        pool: DbPool,
        executor: JobExecutor,
        settings: WorkerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            pool,
            executor,
            settings,
            cancel,
        }
    }

    /// Run until idle timeout or cancellation.
    ///
    /// Cancellation is checked only between jobs: a job that has been
    /// claimed always runs to completion and has its outcome recorded.
    /// Returns an error only for store failures that retrying cannot fix.
    pub async fn run(self) -> Result<WorkerExit, QueueError> {
        let worker_id = self.id;
        tracing::info!(
            worker_id,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            idle_timeout_secs = ?self.settings.idle_timeout.map(|d| d.as_secs_f64()),
            "Worker started"
        );

        let mut idle_cycles: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(worker_id, "Worker stopping");
                return Ok(WorkerExit::Stopped);
            }

            let claimed = match JobRepo::claim_next(&self.pool, Utc::now()).await {
                Ok(claimed) => claimed,
                Err(e) if e.is_transient() => {
                    tracing::warn!(worker_id, error = %e, "Transient store error while claiming");
                    if self.pause(TRANSIENT_RETRY_DELAY).await {
                        return Ok(WorkerExit::Stopped);
                    }
                    continue;
                }
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "Store failure, worker exiting");
                    return Err(e.into());
                }
            };

            match claimed {
                Some(job) => {
                    idle_cycles = 0;
                    if let Err(e) = self.process(job).await {
                        tracing::error!(worker_id, error = %e, "Store failure, worker exiting");
                        return Err(e);
                    }
                }
                None => {
                    idle_cycles = idle_cycles.saturating_add(1);
                    if let Some(limit) = self.settings.idle_timeout {
                        if self.settings.poll_interval.saturating_mul(idle_cycles) >= limit {
                            tracing::info!(worker_id, idle_cycles, "No work left, worker exiting");
                            return Ok(WorkerExit::Idle);
                        }
                    }
                    if self.pause(self.settings.poll_interval).await {
                        tracing::info!(worker_id, "Worker stopping");
                        return Ok(WorkerExit::Stopped);
                    }
                }
            }
        }
    }

    /// Sleep for `duration`. Returns `true` if cancelled meanwhile.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    /// Execute a claimed job and record the result.
    async fn process(&self, job: Job) -> Result<(), QueueError> {
        let worker_id = self.id;
        let pool = &self.pool;
        let job_id = job.id.as_str();
        tracing::info!(
            worker_id,
            job_id,
            attempts = job.attempts,
            priority = job.priority,
            "Job claimed"
        );

        let started_at = Utc::now();
        match with_store_retry(worker_id, move || JobRepo::record_start(pool, job_id, started_at))
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotInState { .. }) => {
                tracing::warn!(worker_id, job_id, "Job replaced after claim, skipping");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let outcome = self
            .executor
            .execute(job_id, &job.command, job.timeout(), job.log_path())
            .await;

        let finished_at = Utc::now().max(started_at);
        let transition =
            job.retry_policy()
                .next_transition(job.attempts, outcome.success(), finished_at);
        state_machine::validate_transition(job_id, JobState::Processing, transition.state())?;

        let next = &transition;
        let updated = match with_store_retry(worker_id, move || {
            JobRepo::record_outcome(pool, job_id, next, finished_at)
        })
        .await
        {
            Ok(updated) => updated,
            Err(StoreError::NotInState { .. }) => {
                tracing::warn!(worker_id, job_id, "Job replaced during execution, outcome dropped");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match transition {
            Transition::Completed => {
                tracing::info!(worker_id, job_id, "Job completed");
            }
            Transition::Retry { attempts, delay, .. } => {
                tracing::warn!(
                    worker_id,
                    job_id,
                    attempts,
                    max_retries = updated.max_retries,
                    delay_secs = delay.as_secs_f64(),
                    "Job failed, scheduled for retry"
                );
            }
            Transition::Dead { attempts } => {
                tracing::error!(worker_id, job_id, attempts, "Job moved to dead-letter queue");
            }
        }
        Ok(())
    }
}

/// Run a store write, retrying transient failures after a short pause until
/// it lands or fails for good.
///
/// Not cancellable: bookkeeping for a claimed job must land, so lock
/// contention only delays the loop.
async fn with_store_retry<T, F, Fut>(worker_id: usize, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut failures: u64 = 0;
    loop {
        match op().await {
            Err(e) if e.is_transient() => {
                failures += 1;
                tracing::warn!(worker_id, error = %e, failures, "Transient store error, retrying");
                tokio::time::sleep(TRANSIENT_RETRY_DELAY).await;
            }
            result => return result,
        }
    }
}
