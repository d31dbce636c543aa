use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use queuectl_core::execution::JobExecutor;
use queuectl_worker::shutdown::shutdown_signal;
use queuectl_worker::{Queue, WorkerConfig, WorkerExit, WorkerPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "queuectl_worker=info,queuectl_db=info,queuectl_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        workers = config.worker_count,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        idle_timeout_secs = ?config.idle_timeout.map(|d| d.as_secs()),
        log_dir = %config.log_dir.display(),
        "Worker configuration loaded"
    );

    let queue = Queue::open(&config)
        .await
        .context("Failed to open job store")?;
    queuectl_db::health_check(queue.pool())
        .await
        .context("Job store health check failed")?;

    let workers = WorkerPool::start(
        queue.pool().clone(),
        config.worker_count,
        config.worker_settings(),
        JobExecutor::new(),
    );

    // First signal: finish in-flight jobs and exit. Second signal: abort.
    let stop = workers.stop_handle();
    let signals = tokio::spawn(async move {
        shutdown_signal().await;
        stop.stop();
        shutdown_signal().await;
        stop.abort();
    });

    let exits = workers.wait().await;
    signals.abort();

    let failed = exits
        .iter()
        .filter(|(_, exit)| matches!(exit, WorkerExit::Failed(_)))
        .count();
    let counts = queue.status().await.context("Failed to read final status")?;
    tracing::info!(
        pending = counts.pending,
        processing = counts.processing,
        completed = counts.completed,
        dead = counts.dead,
        "All workers exited"
    );

    queue.pool().close().await;
    if failed > 0 {
        anyhow::bail!("{failed} worker(s) stopped on a store failure");
    }
    Ok(())
}
