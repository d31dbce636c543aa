//! Shared helpers for worker integration tests.

#![allow(dead_code)]

use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use queuectl_core::execution::JobExecutor;
use queuectl_core::scheduling::JobState;
use queuectl_core::submission::JobDefaults;
use queuectl_db::models::job::Job;
use queuectl_worker::{Queue, Worker, WorkerExit, WorkerSettings};

/// Poll interval used by test workers.
pub const POLL: Duration = Duration::from_millis(50);

/// Upper bound for any single scenario.
pub const SCENARIO_LIMIT: Duration = Duration::from_secs(20);

/// A queue on a migrated, file-backed store in a temp directory.
pub struct TestQueue {
    pub queue: Queue,
    pub dir: TempDir,
}

pub async fn test_queue() -> TestQueue {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());
    let pool = queuectl_db::create_pool(&url)
        .await
        .expect("pool creation should succeed");
    queuectl_db::run_migrations(&pool)
        .await
        .expect("migrations should apply");
    let queue = Queue::new(pool, JobDefaults::default(), dir.path().join("logs"));
    TestQueue { queue, dir }
}

pub fn settings(idle_timeout: Option<Duration>) -> WorkerSettings {
    WorkerSettings {
        poll_interval: POLL,
        idle_timeout,
    }
}

/// Run a single worker loop until it idles out.
pub async fn drain(queue: &Queue, idle_timeout: Duration) -> WorkerExit {
    let worker = Worker::new(
        1,
        queue.pool().clone(),
        JobExecutor::new(),
        settings(Some(idle_timeout)),
        CancellationToken::new(),
    );
    tokio::time::timeout(SCENARIO_LIMIT, worker.run())
        .await
        .expect("worker should idle out in time")
        .expect("worker should not fail")
}

/// Poll the store until job `id` reaches `state`.
pub async fn wait_for_state(queue: &Queue, id: &str, state: JobState, within: Duration) -> Job {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let job = queue.get(id).await.unwrap().expect("job should exist");
        if job.state == state {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} still {} after {within:?}, expected {state}",
            job.state
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn assert_temporal_order(job: &Job) {
    let started = job.started_at.expect("started_at set");
    let finished = job.finished_at.expect("finished_at set");
    assert!(started >= job.created_at, "started before created: {job:?}");
    assert!(finished >= started, "finished before started: {job:?}");
}
