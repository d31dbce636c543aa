//! Worker side of the job queue.
//!
//! [`Queue`] is the facade used by front ends (enqueue, status, listing,
//! logs, dead-letter handling). [`WorkerPool`] supervises the worker loops
//! that claim and execute jobs. Both talk to each other only through the
//! job store.

pub mod config;
pub mod error;
pub mod pool;
pub mod queue;
pub mod runner;
pub mod shutdown;

pub use config::{ConfigError, WorkerConfig};
pub use error::QueueError;
pub use pool::{StopHandle, WorkerPool};
pub use queue::{LogTail, Queue};
pub use runner::{Worker, WorkerExit, WorkerSettings};
