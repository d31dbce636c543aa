use queuectl_core::error::CoreError;
use queuectl_db::StoreError;

/// Errors returned by the queue facade and the worker loops.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
