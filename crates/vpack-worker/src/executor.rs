//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vpack_queue::{JobQueue, QueueJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::{run_job, JobOutcome, PipelineContext};

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let ctx = Arc::new(PipelineContext::new(self.config.clone(), &self.consumer_name).await?);

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically claim jobs orphaned by crashed workers
        let queue_clone = Arc::clone(&self.queue);
        let consumer_name = self.consumer_name.clone();
        let ctx_clone = Arc::clone(&ctx);
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let claim_interval = self.config.claim_interval;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone.depth().await {
                            Ok(depth) => debug!(
                                jobs = depth.jobs,
                                dead_letters = depth.dead_letters,
                                "queue depth"
                            ),
                            Err(e) => debug!("Failed to read queue depth: {}", e),
                        }
                        match queue_clone.claim_stale(&consumer_name, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                for (message_id, job) in jobs {
                                    let ctx = Arc::clone(&ctx_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let Ok(permit) =
                                        Arc::clone(&semaphore_clone).acquire_owned().await
                                    else {
                                        break;
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim stale jobs: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main job consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs(&ctx) => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self, ctx: &Arc<PipelineContext>) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let ctx = Arc::clone(ctx);
            let queue = Arc::clone(&self.queue);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute a single job with retry and DLQ handling.
    async fn execute_job(
        ctx: Arc<PipelineContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: QueueJob,
    ) {
        let job_id = job.job_id().to_string();
        info!("Executing job {}", job_id);

        let QueueJob::PackageVideo(package_job) = job.clone();
        let result = run_job(&ctx, &package_job).await;

        match result {
            Ok(outcome) => {
                match outcome {
                    JobOutcome::Completed => {
                        counter!("vpack_jobs_completed").increment(1);
                        info!("Job {} completed successfully", job_id);
                    }
                    JobOutcome::Skipped => {
                        counter!("vpack_jobs_skipped").increment(1);
                        info!("Job {} skipped", job_id);
                    }
                }
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
                // Clear dedup key so the same source can be resubmitted later
                if let Err(e) = queue.clear_dedup(&job.idempotency_key()).await {
                    warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                counter!("vpack_jobs_failed").increment(1);
                error!("Job {} failed: {}", job_id, e);

                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(999);
                let max_retries = queue.max_retries();

                if retry_count >= max_retries || !e.is_retryable() {
                    warn!(
                        "Job {} is not retryable or exceeded max retries ({}), moving to DLQ",
                        job_id, max_retries
                    );
                    counter!("vpack_jobs_dead_lettered").increment(1);
                    if let Err(dlq_err) = queue.dlq(&message_id, &job, &e.to_string()).await {
                        error!("Failed to move job {} to DLQ: {}", job_id, dlq_err);
                    }
                    // Clear dedup key so the job can be resubmitted manually
                    if let Err(e) = queue.clear_dedup(&job.idempotency_key()).await {
                        warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                    }

                    ctx.progress
                        .error(
                            job.job_id(),
                            format!("Job failed permanently: {}", e),
                        )
                        .await
                        .ok();
                } else {
                    info!(
                        "Job {} will be retried (attempt {}/{})",
                        job_id, retry_count, max_retries
                    );
                    // The job is redelivered after the visibility timeout
                }
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
