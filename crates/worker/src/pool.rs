//! Worker pool supervisor.
//!
//! Starts N independent [`Worker`] loops as tokio tasks sharing one
//! [`CancellationToken`]. A graceful stop cancels the token, so each loop
//! finishes its current job and exits at the next poll boundary. A
//! forceful stop aborts the tasks outright; a job aborted mid-execution is
//! left in `processing` and is not reclaimed.

use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use queuectl_core::execution::JobExecutor;
use queuectl_db::DbPool;

use crate::error::QueueError;
use crate::runner::{Worker, WorkerExit, WorkerSettings};

/// Stops a running [`WorkerPool`] from outside the task awaiting it.
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
    aborts: Vec<AbortHandle>,
}

impl StopHandle {
    /// Let in-flight jobs finish, then exit every loop.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(workers = self.aborts.len(), "Stopping workers gracefully");
        }
        self.cancel.cancel();
    }

    /// Abort every loop immediately, abandoning in-flight jobs.
    pub fn abort(&self) {
        tracing::warn!(workers = self.aborts.len(), "Aborting workers");
        self.cancel.cancel();
        for handle in &self.aborts {
            handle.abort();
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A set of running worker loops.
pub struct WorkerPool {
    handles: Vec<(usize, JoinHandle<Result<WorkerExit, QueueError>>)>,
    stop: StopHandle,
}

impl WorkerPool {
    /// Spawn `count` worker loops against `pool`. Worker ids start at 1.
    pub fn start(
        pool: DbPool,
        count: usize,
        settings: WorkerSettings,
        executor: JobExecutor,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handles: Vec<_> = (1..=count)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    pool.clone(),
                    executor.clone(),
                    settings,
                    cancel.child_token(),
                );
                (id, tokio::spawn(worker.run()))
            })
            .collect();
        let aborts = handles.iter().map(|(_, h)| h.abort_handle()).collect();

        tracing::info!(workers = count, "Worker pool started");
        Self {
            handles,
            stop: StopHandle { cancel, aborts },
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// A handle that can stop or abort this pool while it is awaited.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Graceful stop; see [`StopHandle::stop`].
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Forceful stop; see [`StopHandle::abort`].
    pub fn abort(&self) {
        self.stop.abort();
    }

    /// Wait for every loop to end and report why each one did.
    ///
    /// A failing loop does not affect the others.
    pub async fn wait(self) -> Vec<(usize, WorkerExit)> {
        let mut exits = Vec::with_capacity(self.handles.len());
        for (id, handle) in self.handles {
            let exit = match handle.await {
                Ok(Ok(exit)) => exit,
                Ok(Err(e)) => WorkerExit::Failed(e.to_string()),
                Err(e) if e.is_cancelled() => WorkerExit::Aborted,
                Err(e) => {
                    tracing::error!(worker_id = id, error = %e, "Worker task panicked");
                    WorkerExit::Failed(e.to_string())
                }
            };
            tracing::info!(worker_id = id, exit = ?exit, "Worker exited");
            exits.push((id, exit));
        }
        exits
    }
}
