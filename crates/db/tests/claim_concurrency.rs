//! Concurrent claimers on one store never take the same job twice.

mod common;

use std::collections::HashSet;

use chrono::Utc;

use common::{at, new_job, test_store};
use queuectl_db::repositories::JobRepo;

const CLAIMERS: usize = 5;
const JOBS: usize = 20;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_are_exclusive() {
    let store = test_store().await;
    let base = Utc::now() - chrono::Duration::minutes(1);
    for i in 0..JOBS {
        let id = format!("job-{i:02}");
        JobRepo::insert(&store.pool, &new_job(&id, "true"), at(base, i as i64))
            .await
            .unwrap();
    }

    let mut handles = Vec::with_capacity(CLAIMERS);
    for _ in 0..CLAIMERS {
        let pool = store.pool.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            let mut empty_polls = 0;
            // Keep polling until several consecutive empty polls, since a
            // poll can come back empty after repeated conflicts.
            while empty_polls < 3 {
                match JobRepo::claim_next(&pool, Utc::now()).await.unwrap() {
                    Some(job) => {
                        empty_polls = 0;
                        claimed.push(job.id);
                    }
                    None => empty_polls += 1,
                }
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(all.len(), JOBS, "every job claimed exactly once");
    assert_eq!(unique.len(), JOBS);

    let counts = JobRepo::count_by_state(&store.pool).await.unwrap();
    assert_eq!(counts.processing, JOBS as i64);
    assert_eq!(counts.pending, 0);
}
