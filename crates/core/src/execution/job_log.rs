//! Per-job log file format.
//!
//! Each job owns one append-only file. Every execution attempt writes a
//! `START` marker, the raw process output, and exactly one closing marker:
//!
//! ```text
//! --- START 2025-11-07T12:00:00.000000Z ---
//! <stdout/stderr>
//! --- END 2025-11-07T12:00:01.000000Z rc=0 ---
//! ```
//!
//! A closing marker is `END ... rc=<code>`, `TIMEOUT ... after <n>s`, or
//! `EXCEPTION ... <detail>`.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{format_timestamp, Timestamp};

/// Default number of lines returned by [`tail`] callers that do not ask for
/// a specific count.
pub const DEFAULT_TAIL_LINES: usize = 30;

/// Location of the log file for job `id` inside `log_dir`.
pub fn log_path_for(log_dir: &Path, id: &str) -> PathBuf {
    log_dir.join(format!("job_{id}.log"))
}

pub fn start_marker(at: Timestamp) -> String {
    format!("--- START {} ---\n", format_timestamp(at))
}

pub fn end_marker(at: Timestamp, exit_code: i32) -> String {
    format!("\n--- END {} rc={exit_code} ---\n", format_timestamp(at))
}

pub fn timeout_marker(at: Timestamp, limit: Duration) -> String {
    let after = if limit.subsec_nanos() == 0 {
        limit.as_secs().to_string()
    } else {
        format!("{:.3}", limit.as_secs_f64())
    };
    format!("\n--- TIMEOUT {} after {after}s ---\n", format_timestamp(at))
}

pub fn exception_marker(at: Timestamp, detail: &str) -> String {
    // Keep the marker on one line even if the error text spans several.
    let detail = detail.replace('\n', " ");
    format!("\n--- EXCEPTION {} {detail} ---\n", format_timestamp(at))
}

/// Read the last `lines` lines of the log at `path`.
///
/// Returns `Ok(None)` when the file does not exist yet (the job has never
/// started). Invalid UTF-8 in process output is replaced, not rejected.
pub async fn tail(path: &Path, lines: usize) -> io::Result<Option<Vec<String>>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let text = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = text.lines().collect();
    let skip = all.len().saturating_sub(lines);
    Ok(Some(all[skip..].iter().map(|l| l.to_string()).collect()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn at() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 11, 7, 12, 0, 0).unwrap()
    }

    #[test]
    fn markers_match_record_format() {
        assert_eq!(start_marker(at()), "--- START 2025-11-07T12:00:00.000000Z ---\n");
        assert_eq!(
            end_marker(at(), 3),
            "\n--- END 2025-11-07T12:00:00.000000Z rc=3 ---\n"
        );
        assert_eq!(
            timeout_marker(at(), Duration::from_secs(10)),
            "\n--- TIMEOUT 2025-11-07T12:00:00.000000Z after 10s ---\n"
        );
    }

    #[test]
    fn exception_marker_is_single_line() {
        let marker = exception_marker(at(), "spawn failed\nno such file");
        assert_eq!(marker.trim().lines().count(), 1);
        assert!(marker.contains("EXCEPTION 2025-11-07T12:00:00.000000Z spawn failed no such file"));
    }

    #[test]
    fn log_path_uses_job_id() {
        assert_eq!(
            log_path_for(Path::new("/var/q/logs"), "abc"),
            PathBuf::from("/var/q/logs/job_abc.log")
        );
    }

    #[tokio::test]
    async fn tail_of_missing_file_is_none() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let result = tail(&dir.path().join("nope.log"), 10).await.expect("tail");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn tail_returns_last_lines() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("job_x.log");
        std::fs::write(&path, "a\nb\nc\nd\n").expect("write log");

        let lines = tail(&path, 2).await.expect("tail").expect("file exists");
        assert_eq!(lines, vec!["c".to_string(), "d".to_string()]);

        let all = tail(&path, 100).await.expect("tail").expect("file exists");
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn tail_replaces_invalid_utf8() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("job_bin.log");
        std::fs::write(&path, b"ok\n\xff\xfe\n").expect("write log");

        let lines = tail(&path, 5).await.expect("tail").expect("file exists");
        assert_eq!(lines[0], "ok");
        assert!(lines[1].contains('\u{FFFD}'));
    }
}
