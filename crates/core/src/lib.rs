//! Domain logic for the persistent shell-job queue.
//!
//! Everything here is free of database access: the job state machine, the
//! retry/backoff policy, enqueue validation, and the subprocess executor
//! that writes per-job logs. The `db` and `worker` crates build on top.

pub mod error;
pub mod execution;
pub mod retry;
pub mod scheduling;
pub mod submission;
pub mod types;
