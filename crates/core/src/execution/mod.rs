//! Job execution: subprocess management and per-job log files.
//!
//! All subprocess handling is pure (no DB access) and lives in `core` so it
//! can be tested in isolation. The worker loop records the resulting
//! [`ExecutionOutcome`] through the store.

pub mod executor;
pub mod job_log;

pub use executor::{ExecutionEnd, ExecutionOutcome, JobExecutor};
