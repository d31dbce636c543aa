//! Job entity model and DTOs.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use sqlx::FromRow;

use queuectl_core::retry::RetryPolicy;
use queuectl_core::scheduling::JobState;
use queuectl_core::submission::JobSubmission;
use queuectl_core::types::{JobId, Timestamp};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    #[sqlx(try_from = "String")]
    pub state: JobState,
    pub attempts: i64,
    pub max_retries: i64,
    pub base_backoff: f64,
    pub priority: i64,
    pub timeout_seconds: Option<i64>,
    pub log_path: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub available_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl Job {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_backoff: self.base_backoff,
        }
    }

    /// The execution time limit, if the job has one.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .and_then(|secs| u64::try_from(secs).ok())
            .map(Duration::from_secs)
    }

    pub fn log_path(&self) -> &Path {
        Path::new(&self.log_path)
    }
}

/// DTO for inserting a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub command: String,
    pub max_retries: i64,
    pub base_backoff: f64,
    pub priority: i64,
    pub timeout_seconds: Option<i64>,
    pub log_path: String,
    pub available_at: Timestamp,
}

impl NewJob {
    /// Build the insert DTO for a validated submission logging to `log_path`.
    pub fn from_submission(submission: JobSubmission, log_path: String) -> Self {
        Self {
            id: submission.id,
            command: submission.command,
            max_retries: submission.max_retries,
            base_backoff: submission.base_backoff,
            priority: submission.priority,
            timeout_seconds: submission.timeout_seconds,
            log_path,
            available_at: submission.available_at,
        }
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobListQuery {
    /// Only return jobs in this state.
    pub state: Option<JobState>,
}

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub dead: i64,
}

impl StateCounts {
    pub fn get(&self, state: JobState) -> i64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Dead => self.dead,
        }
    }

    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.dead
    }

    pub(crate) fn add(&mut self, state: JobState, count: i64) {
        match state {
            JobState::Pending => self.pending += count,
            JobState::Processing => self.processing += count,
            JobState::Completed => self.completed += count,
            JobState::Dead => self.dead += count,
        }
    }
}

/// Aggregate execution statistics across all jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QueueMetrics {
    pub total: i64,
    pub completed: i64,
    pub dead: i64,
    /// Mean `attempts` over jobs that have failed at least once.
    pub avg_attempts: f64,
    /// Mean `finished_at - started_at` over jobs with both timestamps.
    pub avg_duration_secs: f64,
}
