//! Enqueue request validation and default resolution.
//!
//! Turns a loosely-typed [`EnqueueRequest`] (every field optional except
//! `command`) into a fully-resolved [`JobSubmission`], filling omitted
//! numeric fields from [`JobDefaults`]. Invalid input is rejected here and
//! never reaches the store.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::CoreError;
use crate::scheduling::PRIORITY_NORMAL;
use crate::types::{JobId, Timestamp};

/// Default `max_retries` when neither the request nor the configuration set one.
pub const DEFAULT_MAX_RETRIES: i64 = 3;

/// Default `base_backoff` in seconds.
pub const DEFAULT_BASE_BACKOFF: f64 = 2.0;

/// Fallback values for fields an enqueue request leaves out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobDefaults {
    pub max_retries: i64,
    pub base_backoff: f64,
    /// `None` means jobs run without a time limit unless they ask for one.
    pub timeout_seconds: Option<i64>,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: DEFAULT_BASE_BACKOFF,
            timeout_seconds: None,
        }
    }
}

/// A client's request to enqueue a job.
///
/// Deserializes from the JSON document accepted by `enqueue`, e.g.
/// `{"id":"job1","command":"sleep 2","max_retries":3,"priority":1,
/// "run_at":"2025-11-07T12:00:00Z","timeout_seconds":10}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnqueueRequest {
    pub id: Option<String>,
    #[serde(default)]
    pub command: String,
    pub max_retries: Option<i64>,
    pub base_backoff: Option<f64>,
    pub priority: Option<i64>,
    /// RFC 3339 instant before which the job must not be claimed.
    pub run_at: Option<String>,
    pub timeout_seconds: Option<i64>,
}

impl EnqueueRequest {
    /// A request for `command` with every other field left to defaults.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON enqueue document.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid job JSON: {e}")))
    }
}

/// A validated job ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSubmission {
    pub id: JobId,
    pub command: String,
    pub max_retries: i64,
    pub base_backoff: f64,
    pub priority: i64,
    pub timeout_seconds: Option<i64>,
    pub available_at: Timestamp,
}

/// Validate `request` and fill in defaults.
///
/// Rules:
/// - `command` must not be empty or whitespace.
/// - `id`, when given, must be non-empty and free of path separators (it
///   names the job's log file). A fresh UUID is generated otherwise.
/// - `max_retries` must be at least 1.
/// - `base_backoff` must be a finite number greater than zero.
/// - `timeout_seconds`, when set, must be greater than zero.
/// - `run_at` must be RFC 3339; without it the job is eligible at `now`.
pub fn resolve(
    request: EnqueueRequest,
    defaults: &JobDefaults,
    now: Timestamp,
) -> Result<JobSubmission, CoreError> {
    if request.command.trim().is_empty() {
        return Err(CoreError::Validation(
            "Job must include a non-empty 'command' field".to_string(),
        ));
    }

    let id = match request.id {
        Some(id) => {
            validate_job_id(&id)?;
            id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let max_retries = request.max_retries.unwrap_or(defaults.max_retries);
    if max_retries < 1 {
        return Err(CoreError::Validation(format!(
            "max_retries must be at least 1, got {max_retries}"
        )));
    }

    let base_backoff = request.base_backoff.unwrap_or(defaults.base_backoff);
    if !base_backoff.is_finite() || base_backoff <= 0.0 {
        return Err(CoreError::Validation(format!(
            "base_backoff must be a positive number, got {base_backoff}"
        )));
    }

    let timeout_seconds = request.timeout_seconds.or(defaults.timeout_seconds);
    if let Some(secs) = timeout_seconds {
        if secs <= 0 {
            return Err(CoreError::Validation(format!(
                "timeout_seconds must be greater than zero, got {secs}"
            )));
        }
    }

    let available_at = match request.run_at.as_deref() {
        Some(run_at) => parse_run_at(run_at)?,
        None => now,
    };

    Ok(JobSubmission {
        id,
        command: request.command,
        max_retries,
        base_backoff,
        priority: request.priority.unwrap_or(PRIORITY_NORMAL),
        timeout_seconds,
        available_at,
    })
}

fn validate_job_id(id: &str) -> Result<(), CoreError> {
    if id.trim().is_empty() {
        return Err(CoreError::Validation("Job id must not be empty".to_string()));
    }
    if id.contains(['/', '\\', '\0']) {
        return Err(CoreError::Validation(format!(
            "Job id '{id}' may not contain path separators"
        )));
    }
    Ok(())
}

fn parse_run_at(run_at: &str) -> Result<Timestamp, CoreError> {
    DateTime::parse_from_rfc3339(run_at)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CoreError::Validation(format!("run_at '{run_at}' is not RFC 3339: {e}")))
}
