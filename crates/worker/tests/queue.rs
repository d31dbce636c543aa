//! Queue facade operations that do not need a running worker.

mod common;

use assert_matches::assert_matches;

use common::{drain, test_queue};
use queuectl_core::error::CoreError;
use queuectl_core::scheduling::JobState;
use queuectl_core::submission::{EnqueueRequest, JobDefaults};
use queuectl_worker::{Queue, QueueError};

#[tokio::test]
async fn enqueue_applies_defaults() {
    let t = test_queue().await;
    let id = t.queue.enqueue(EnqueueRequest::new("echo hi")).await.unwrap();

    let job = t.queue.get(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_retries, 3);
    assert_eq!(job.base_backoff, 2.0);
    assert_eq!(job.priority, 0);
    assert_eq!(job.timeout_seconds, None);
    assert!(job.log_path.ends_with(&format!("job_{id}.log")));
}

#[tokio::test]
async fn enqueue_uses_configured_default_timeout() {
    let t = test_queue().await;
    let queue = Queue::new(
        t.queue.pool().clone(),
        JobDefaults {
            timeout_seconds: Some(30),
            ..JobDefaults::default()
        },
        t.dir.path().join("logs"),
    );

    let id = queue.enqueue(EnqueueRequest::new("echo hi")).await.unwrap();

    let job = queue.get(&id).await.unwrap().unwrap();
    assert_eq!(job.timeout_seconds, Some(30));
}

#[tokio::test]
async fn empty_command_is_rejected_and_not_stored() {
    let t = test_queue().await;

    let err = t.queue.enqueue(EnqueueRequest::new("   ")).await.unwrap_err();

    assert_matches!(err, QueueError::Core(CoreError::Validation(_)));
    assert_eq!(t.queue.status().await.unwrap().total(), 0);
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let t = test_queue().await;

    let err = t.queue.enqueue_json("{not json").await.unwrap_err();
    assert_matches!(err, QueueError::Core(CoreError::Validation(_)));

    let err = t.queue.enqueue_json(r#"{"id":"x"}"#).await.unwrap_err();
    assert_matches!(err, QueueError::Core(CoreError::Validation(_)));
}

#[tokio::test]
async fn enqueue_json_keeps_client_fields() {
    let t = test_queue().await;

    let id = t
        .queue
        .enqueue_json(
            r#"{"id":"job1","command":"sleep 2","max_retries":5,"priority":4,"timeout_seconds":10}"#,
        )
        .await
        .unwrap();

    assert_eq!(id, "job1");
    let job = t.queue.get("job1").await.unwrap().unwrap();
    assert_eq!(job.command, "sleep 2");
    assert_eq!(job.max_retries, 5);
    assert_eq!(job.priority, 4);
    assert_eq!(job.timeout_seconds, Some(10));
}

#[tokio::test]
async fn enqueue_same_id_overwrites() {
    let t = test_queue().await;
    let first = EnqueueRequest {
        id: Some("same".into()),
        ..EnqueueRequest::new("echo one")
    };
    let second = EnqueueRequest {
        id: Some("same".into()),
        ..EnqueueRequest::new("echo two")
    };

    t.queue.enqueue(first).await.unwrap();
    t.queue.enqueue(second).await.unwrap();

    let jobs = t.queue.list(None).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].command, "echo two");
}

#[tokio::test]
async fn status_and_list_reflect_states() {
    let t = test_queue().await;
    let ok = t.queue.enqueue(EnqueueRequest::new("true")).await.unwrap();
    let bad = t
        .queue
        .enqueue(EnqueueRequest {
            max_retries: Some(1),
            ..EnqueueRequest::new("false")
        })
        .await
        .unwrap();
    drain(&t.queue, std::time::Duration::from_millis(200)).await;
    let fresh = t.queue.enqueue(EnqueueRequest::new("true")).await.unwrap();

    let counts = t.queue.status().await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.processing, 0);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.dead, 1);

    let all: Vec<String> = t.queue.list(None).await.unwrap().into_iter().map(|j| j.id).collect();
    assert_eq!(all, vec![ok.clone(), bad.clone(), fresh.clone()]);

    let dead: Vec<String> = t
        .queue
        .list(Some(JobState::Dead))
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(dead, vec![bad]);

    let metrics = t.queue.metrics().await.unwrap();
    assert_eq!(metrics.total, 3);
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.dead, 1);
    assert_eq!(metrics.avg_attempts, 1.0);
}

#[tokio::test]
async fn logs_of_unstarted_job_are_empty() {
    let t = test_queue().await;
    let id = t.queue.enqueue(EnqueueRequest::new("echo hi")).await.unwrap();

    let tail = t.queue.logs(&id, 10).await.unwrap();

    assert!(!tail.found);
    assert!(tail.lines.is_empty());
    assert!(tail.path.ends_with(format!("job_{id}.log")));
}

#[tokio::test]
async fn logs_of_unknown_job_are_empty() {
    let t = test_queue().await;

    let tail = t.queue.logs("ghost", 10).await.unwrap();

    assert!(!tail.found);
    assert!(tail.lines.is_empty());
    assert!(tail.path.ends_with("job_ghost.log"));
}

#[tokio::test]
async fn logs_tail_is_limited() {
    let t = test_queue().await;
    let id = t
        .queue
        .enqueue(EnqueueRequest::new("for i in 1 2 3 4 5; do echo line$i; done"))
        .await
        .unwrap();
    drain(&t.queue, std::time::Duration::from_millis(200)).await;

    let tail = t.queue.logs(&id, 2).await.unwrap();

    assert_eq!(tail.lines.len(), 2);
    assert!(tail.lines[1].starts_with("--- END "));
}

#[tokio::test]
async fn reinitialize_empties_the_queue() {
    let t = test_queue().await;
    t.queue.enqueue(EnqueueRequest::new("echo hi")).await.unwrap();

    t.queue.reinitialize().await.unwrap();

    assert_eq!(t.queue.status().await.unwrap().total(), 0);
    t.queue.enqueue(EnqueueRequest::new("echo again")).await.unwrap();
    assert_eq!(t.queue.status().await.unwrap().pending, 1);
}
