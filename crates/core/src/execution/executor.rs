//! Shell command executor.
//!
//! Spawns `sh -c <command>` with stdout and stderr appended to the job's log
//! file, enforces the optional timeout, and brackets the output with the
//! markers defined in [`job_log`](super::job_log).

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::job_log;

/// Shell used to interpret job commands.
const DEFAULT_SHELL: &str = "sh";

/// How an execution attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEnd {
    /// The process exited on its own. Negative signal number if it was
    /// killed by a signal.
    Exited { code: i32 },
    /// The process exceeded its timeout and was killed.
    TimedOut { after: Duration },
    /// The process could not be run (log file or spawn failure).
    Errored { detail: String },
}

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub end: ExecutionEnd,
    /// Wall-clock time spent on the attempt.
    pub duration: Duration,
}

impl ExecutionOutcome {
    /// Only a zero exit code counts as success.
    pub fn success(&self) -> bool {
        matches!(self.end, ExecutionEnd::Exited { code: 0 })
    }
}

/// Runs job commands through a shell, logging to a per-job file.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    shell: String,
}

impl Default for JobExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl JobExecutor {
    pub fn new() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
        }
    }

    /// Use `shell` instead of `sh` to interpret commands.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Execute `command`, appending all output to `log_path`.
    ///
    /// Never returns an error: failures to open the log or spawn the process
    /// are recorded as an `EXCEPTION` marker and reported as
    /// [`ExecutionEnd::Errored`].
    pub async fn execute(
        &self,
        job_id: &str,
        command: &str,
        timeout: Option<Duration>,
        log_path: &Path,
    ) -> ExecutionOutcome {
        tracing::info!(job_id, command, timeout_secs = ?timeout.map(|t| t.as_secs()), "Executing job");
        let start = Instant::now();

        let end = match self.run(command, timeout, log_path).await {
            Ok(end) => end,
            Err(e) => {
                let detail = e.to_string();
                tracing::error!(job_id, error = %e, "Job execution failed");
                let marker = job_log::exception_marker(Utc::now(), &detail);
                if let Err(log_err) = append(log_path, &marker).await {
                    tracing::warn!(job_id, error = %log_err, "Could not write EXCEPTION marker");
                }
                ExecutionEnd::Errored { detail }
            }
        };

        let outcome = ExecutionOutcome {
            end,
            duration: start.elapsed(),
        };
        tracing::info!(
            job_id,
            success = outcome.success(),
            end = ?outcome.end,
            duration_ms = outcome.duration.as_millis() as u64,
            "Job execution finished"
        );
        outcome
    }

    async fn run(
        &self,
        command: &str,
        timeout: Option<Duration>,
        log_path: &Path,
    ) -> io::Result<ExecutionEnd> {
        let mut log = open_log(log_path).await?;
        write_marker(&mut log, &job_log::start_marker(Utc::now())).await?;

        let stdout = log.try_clone().await?.into_std().await;
        let stderr = log.try_clone().await?.into_std().await;

        // `kill_on_drop(true)` ensures the child dies with a forcefully
        // stopped worker instead of outliving it.
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()?;

        let status = match timeout {
            None => child.wait().await?,
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_elapsed) => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill timed-out process");
                    }
                    write_marker(&mut log, &job_log::timeout_marker(Utc::now(), limit)).await?;
                    return Ok(ExecutionEnd::TimedOut { after: limit });
                }
            },
        };

        let code = exit_code(status);
        write_marker(&mut log, &job_log::end_marker(Utc::now(), code)).await?;
        Ok(ExecutionEnd::Exited { code })
    }
}

/// Exit code of `status`, or the negated signal number on unix.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

async fn open_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path).await
}

async fn write_marker(log: &mut File, marker: &str) -> io::Result<()> {
    log.write_all(marker.as_bytes()).await?;
    // tokio buffers file writes on a blocking thread; flush so the marker
    // lands before the child (or the next writer) touches the file.
    log.flush().await
}

async fn append(path: &Path, marker: &str) -> io::Result<()> {
    let mut log = open_log(path).await?;
    write_marker(&mut log, marker).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
