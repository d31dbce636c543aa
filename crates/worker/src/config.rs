use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use queuectl_core::submission::{JobDefaults, DEFAULT_BASE_BACKOFF, DEFAULT_MAX_RETRIES};

use crate::runner::WorkerSettings;

/// A configuration variable held a value that could not be used.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub expected: &'static str,
    pub value: String,
}

/// Worker and queue configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// SQLite URL of the job store.
    pub database_url: String,
    /// Directory holding the per-job log files.
    pub log_dir: PathBuf,
    /// Number of worker loops the binary starts.
    pub worker_count: usize,
    /// Sleep between polls that found no eligible job.
    pub poll_interval: Duration,
    /// Consecutive idle time after which a loop exits. `None` runs until
    /// stopped.
    pub idle_timeout: Option<Duration>,
    /// Defaults applied to enqueue requests that omit a field.
    pub defaults: JobDefaults,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://queue.db".into(),
            log_dir: PathBuf::from("logs"),
            worker_count: 1,
            poll_interval: Duration::from_millis(1000),
            idle_timeout: Some(Duration::from_secs(3)),
            defaults: JobDefaults::default(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default             |
    /// |----------------------------|---------------------|
    /// | `DATABASE_URL`             | `sqlite://queue.db` |
    /// | `QUEUE_LOG_DIR`            | `logs`              |
    /// | `WORKER_COUNT`             | `1`                 |
    /// | `POLL_INTERVAL_MS`         | `1000`              |
    /// | `IDLE_TIMEOUT_SECS`        | `3` (`0` disables)  |
    /// | `JOB_MAX_RETRIES`          | `3`                 |
    /// | `JOB_BASE_BACKOFF`         | `2.0`               |
    /// | `JOB_DEFAULT_TIMEOUT_SECS` | unset               |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").unwrap_or(defaults.database_url);
        let log_dir = lookup("QUEUE_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.log_dir);

        let worker_count: usize = parse_var(&lookup, "WORKER_COUNT", "a positive integer")?
            .unwrap_or(defaults.worker_count);
        if worker_count == 0 {
            return Err(invalid("WORKER_COUNT", "a positive integer", "0"));
        }

        let poll_interval = match parse_var::<u64, _>(&lookup, "POLL_INTERVAL_MS", "a positive integer")? {
            Some(0) => return Err(invalid("POLL_INTERVAL_MS", "a positive integer", "0")),
            Some(ms) => Duration::from_millis(ms),
            None => defaults.poll_interval,
        };

        let idle_timeout = match parse_var::<u64, _>(&lookup, "IDLE_TIMEOUT_SECS", "a non-negative integer")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.idle_timeout,
        };

        let max_retries: i64 = parse_var(&lookup, "JOB_MAX_RETRIES", "an integer of at least 1")?
            .unwrap_or(DEFAULT_MAX_RETRIES);
        if max_retries < 1 {
            return Err(invalid(
                "JOB_MAX_RETRIES",
                "an integer of at least 1",
                &max_retries.to_string(),
            ));
        }

        let base_backoff: f64 = parse_var(&lookup, "JOB_BASE_BACKOFF", "a positive number")?
            .unwrap_or(DEFAULT_BASE_BACKOFF);
        if !base_backoff.is_finite() || base_backoff <= 0.0 {
            return Err(invalid(
                "JOB_BASE_BACKOFF",
                "a positive number",
                &base_backoff.to_string(),
            ));
        }

        let timeout_seconds: Option<i64> =
            parse_var(&lookup, "JOB_DEFAULT_TIMEOUT_SECS", "a positive integer")?;
        if let Some(secs) = timeout_seconds.filter(|secs| *secs <= 0) {
            return Err(invalid(
                "JOB_DEFAULT_TIMEOUT_SECS",
                "a positive integer",
                &secs.to_string(),
            ));
        }

        Ok(Self {
            database_url,
            log_dir,
            worker_count,
            poll_interval,
            idle_timeout,
            defaults: JobDefaults {
                max_retries,
                base_backoff,
                timeout_seconds,
            },
        })
    }

    /// Loop timing for the worker pool.
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_interval: self.poll_interval,
            idle_timeout: self.idle_timeout,
        }
    }
}

/// Parse `var` if set. Empty values count as unset.
fn parse_var<T, F>(lookup: &F, var: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(var, expected, &raw)),
        _ => Ok(None),
    }
}

fn invalid(var: &'static str, expected: &'static str, value: &str) -> ConfigError {
    ConfigError {
        var,
        expected,
        value: value.to_string(),
    }
}
