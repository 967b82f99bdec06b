//! Redis queue integration tests.

use std::time::Duration;

use vpack_queue::{JobQueue, PackageVideoJob, QueueConfig, QueueJob};

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn redis_connection() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let depth = queue.depth().await.expect("Failed to get queue depth");
    println!("Queue depth: {:?}", depth);
}

/// Test job enqueue and dequeue cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn job_enqueue_dequeue() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job = PackageVideoJob::new(
        format!("uploads/test/{}.mp4", uuid_suffix()),
        "test.mp4",
    )
    .with_owner("test_user_123");
    let job_id = job.job_id.clone();
    let idempotency_key = job.idempotency_key();

    let message_id = queue
        .enqueue_package(job)
        .await
        .expect("Failed to enqueue");
    println!("Enqueued job {} with message ID {}", job_id, message_id);

    let jobs = queue
        .consume("test-consumer", 1000, 1)
        .await
        .expect("Failed to consume");

    assert_eq!(jobs.len(), 1);
    let (msg_id, consumed_job) = &jobs[0];
    assert_eq!(consumed_job.job_id(), &job_id);

    queue.ack(msg_id).await.expect("Failed to ack");
    queue
        .clear_dedup(&idempotency_key)
        .await
        .expect("Failed to clear dedup key");
}

/// Test that a duplicate enqueue is rejected while the dedup key lives.
#[tokio::test]
#[ignore = "requires Redis"]
async fn duplicate_enqueue_rejected() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let source_key = format!("uploads/test/{}.mp4", uuid_suffix());
    let first = PackageVideoJob::new(&source_key, "test.mp4").with_owner("test_dedup_user");
    let idempotency_key = first.idempotency_key();

    queue
        .enqueue_package(first)
        .await
        .expect("Failed to enqueue first job");

    let second = PackageVideoJob::new(&source_key, "test.mp4").with_owner("test_dedup_user");
    let result = queue.enqueue_package(second).await;
    assert!(result.is_err(), "duplicate should be rejected");

    // Drain and clean up
    let jobs = queue
        .consume("test-consumer", 1000, 10)
        .await
        .expect("Failed to consume");
    for (msg_id, _) in &jobs {
        queue.ack(msg_id).await.expect("Failed to ack");
    }
    queue
        .clear_dedup(&idempotency_key)
        .await
        .expect("Failed to clear dedup key");
}

/// Test DLQ functionality.
#[tokio::test]
#[ignore = "requires Redis"]
async fn dead_letter_queue() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job = PackageVideoJob::new(
        format!("uploads/test/{}.mp4", uuid_suffix()),
        "test.mp4",
    )
    .with_owner("test_dlq_user");
    let idempotency_key = job.idempotency_key();

    queue
        .enqueue_package(job)
        .await
        .expect("Failed to enqueue");

    let jobs = queue
        .consume("test-consumer", 1000, 1)
        .await
        .expect("Failed to consume");
    assert_eq!(jobs.len(), 1);
    let (msg_id, consumed) = &jobs[0];

    let before = queue.depth().await.expect("Failed to get queue depth");
    queue
        .dlq(msg_id, consumed, "simulated failure")
        .await
        .expect("Failed to move to DLQ");
    let after = queue.depth().await.expect("Failed to get queue depth");
    assert_eq!(after.dead_letters, before.dead_letters + 1);

    queue
        .clear_dedup(&idempotency_key)
        .await
        .expect("Failed to clear dedup key");
}

/// Test retry counter increments with a TTL.
#[tokio::test]
#[ignore = "requires Redis"]
async fn retry_counter() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");

    let message_id = format!("test-{}", uuid_suffix());
    assert_eq!(
        queue
            .get_retry_count(&message_id)
            .await
            .expect("Failed to get retry count"),
        0
    );
    assert_eq!(
        queue
            .increment_retry(&message_id)
            .await
            .expect("Failed to increment"),
        1
    );
    assert_eq!(
        queue
            .increment_retry(&message_id)
            .await
            .expect("Failed to increment"),
        2
    );
}

/// A message pending longer than the visibility timeout can be taken over
/// by another consumer.
#[tokio::test]
#[ignore = "requires Redis"]
async fn stale_message_claimed_by_another_consumer() {
    dotenvy::dotenv().ok();

    // Zero visibility timeout makes every pending message immediately stale
    let config = QueueConfig {
        visibility_timeout: Duration::ZERO,
        ..QueueConfig::from_env()
    };
    let queue = JobQueue::new(config).expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job = PackageVideoJob::new(
        format!("uploads/test/{}.mp4", uuid_suffix()),
        "test.mp4",
    )
    .with_owner("test_claim_user");
    let job_id = job.job_id.clone();
    let idempotency_key = job.idempotency_key();

    queue.enqueue_package(job).await.expect("Failed to enqueue");

    // Consumer A reads the message but never acks it
    let jobs = queue
        .consume("crashed-consumer", 1000, 1)
        .await
        .expect("Failed to consume");
    assert_eq!(jobs.len(), 1);

    // Consumer B claims it
    let claimed = queue
        .claim_stale("live-consumer", 5)
        .await
        .expect("Failed to claim");
    assert!(
        claimed.iter().any(|(_, j)| j.job_id() == &job_id),
        "stale job should be claimable"
    );

    for (msg_id, _) in &claimed {
        queue.ack(msg_id).await.expect("Failed to ack");
    }
    queue
        .clear_dedup(&idempotency_key)
        .await
        .expect("Failed to clear dedup key");
}

fn uuid_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    format!("{:x}", nanos)
}
