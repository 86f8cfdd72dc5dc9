mod common;

use chatvault::queries::jobs;
use common::TestDb;
use serde_json::json;

#[tokio::test]
async fn dequeue_leases_job_and_hides_it_from_other_workers() {
    let test_db = TestDb::new("dequeue_leases_job_and_hides_it_from_other_workers").await;
    let mut conn = test_db.get_connection().await;

    let job = jobs::enqueue(&mut conn, "generate_embedding", json!({"message_id": "x"}), 5)
        .await
        .unwrap();

    let leased = jobs::dequeue_next(&mut conn, "generate_embedding", 10, 300, "worker-a")
        .await
        .unwrap();
    assert_eq!(leased.len(), 1);
    assert_eq!(leased[0].id, job.id);

    let again = jobs::dequeue_next(&mut conn, "generate_embedding", 10, 300, "worker-b")
        .await
        .unwrap();
    assert!(again.is_empty(), "a leased job must not be dequeued again until its lease expires");

    jobs::mark_completed(&mut conn, job.id).await.unwrap();
    let stats = jobs::get_queue_stats(&mut conn, "generate_embedding").await.unwrap();
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn expired_lease_is_reclaimed_to_pending() {
    let test_db = TestDb::new("expired_lease_is_reclaimed_to_pending").await;
    let mut conn = test_db.get_connection().await;

    let job = jobs::enqueue(&mut conn, "generate_embedding", json!({}), 5).await.unwrap();
    // lease_duration_seconds = 0 so it is immediately expired
    jobs::dequeue_next(&mut conn, "generate_embedding", 10, -1, "worker-a")
        .await
        .unwrap();

    let reclaimed = jobs::reclaim_expired_leases(&mut conn).await.unwrap();
    assert!(reclaimed >= 1);

    let pending = jobs::get_pending_jobs(&mut conn, "generate_embedding", 10).await.unwrap();
    assert!(pending.iter().any(|j| j.id == job.id));
}

#[tokio::test]
async fn permanent_failure_skips_retry_and_terminates() {
    let test_db = TestDb::new("permanent_failure_skips_retry_and_terminates").await;
    let mut conn = test_db.get_connection().await;

    let job = jobs::enqueue(&mut conn, "generate_embedding", json!({}), 5).await.unwrap();
    jobs::mark_failed(&mut conn, job.id, "malformed payload", true, chrono::Duration::zero())
        .await
        .unwrap();

    let pending = jobs::get_pending_jobs(&mut conn, "generate_embedding", 10).await.unwrap();
    assert!(!pending.iter().any(|j| j.id == job.id));

    let stats = jobs::get_queue_stats(&mut conn, "generate_embedding").await.unwrap();
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn transient_failure_requeues_with_backoff_until_max_attempts() {
    let test_db = TestDb::new("transient_failure_requeues_with_backoff_until_max_attempts").await;
    let mut conn = test_db.get_connection().await;

    let job = jobs::enqueue(&mut conn, "generate_embedding", json!({}), 1).await.unwrap();
    jobs::dequeue_next(&mut conn, "generate_embedding", 10, 300, "worker-a")
        .await
        .unwrap();

    jobs::mark_failed(&mut conn, job.id, "transient", false, chrono::Duration::seconds(0))
        .await
        .unwrap();

    let stats = jobs::get_queue_stats(&mut conn, "generate_embedding").await.unwrap();
    assert_eq!(stats.failed, 1, "max_attempts=1 was already consumed by the one dequeue attempt");
}
