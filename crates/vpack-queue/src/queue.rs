//! Redis Streams job source.
//!
//! One stream carries packaging jobs, one consumer group shares them across
//! workers, and a second stream collects dead letters. A job is invisible to
//! other consumers while pending; messages pending longer than the visibility
//! timeout are treated as orphaned and may be claimed by any live worker.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamPendingReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{PackageVideoJob, QueueJob};

/// Stream entry field holding the serialized job.
const PAYLOAD_FIELD: &str = "job";
/// How long an idempotency reservation outlives its enqueue.
const DEDUP_TTL_SECS: u64 = 3600;
/// How long a message's retry counter is kept.
const RETRY_TTL_SECS: i64 = 86400;

fn dedup_key(idempotency_key: &str) -> String {
    format!("vpack:dedup:{}", idempotency_key)
}

fn retry_key(message_id: &str) -> String {
    format!("vpack:retry:{}", message_id)
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream name
    pub dlq_stream_name: String,
    /// Max delivery attempts before a failing job is dead-lettered
    pub max_retries: u32,
    /// Pending time after which a message counts as orphaned
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vpack:jobs".to_string(),
            consumer_group: "vpack:workers".to_string(),
            dlq_stream_name: "vpack:dlq".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
        }
    }
}

/// Snapshot of stream lengths, for periodic depth logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepth {
    pub jobs: u64,
    pub dead_letters: u64,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Create the consumer group if it does not exist yet.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a packaging job.
    ///
    /// The idempotency key is reserved atomically before the job enters the
    /// stream, so a concurrent duplicate of the same source loses the
    /// reservation instead of racing past a lookup.
    pub async fn enqueue_package(&self, job: PackageVideoJob) -> QueueResult<String> {
        let mut conn = self.conn().await?;

        let idempotency_key = job.idempotency_key();
        let reserved: Option<String> = redis::cmd("SET")
            .arg(dedup_key(&idempotency_key))
            .arg(job.job_id.as_str())
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        if reserved.is_none() {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::enqueue_failed("Duplicate job"));
        }

        let wrapped = QueueJob::PackageVideo(job);
        let payload = serde_json::to_string(&wrapped)?;
        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await;
        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                // A failed enqueue must not leave the source blocked
                conn.del::<_, ()>(dedup_key(&idempotency_key)).await.ok();
                return Err(QueueError::Redis(e));
            }
        };

        info!(
            "Enqueued job {} with message ID {}",
            wrapped.job_id(),
            message_id
        );
        Ok(message_id)
    }

    /// Acknowledge a message and drop it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::pipe()
            .cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job: {}", message_id);
        Ok(())
    }

    /// Move a job to the dead letter stream and ack the original message.
    pub async fn dlq(&self, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let payload = serde_json::to_string(job)?;
        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<String>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!("Moved job {} to DLQ: {}", job.job_id(), error);
        Ok(())
    }

    /// Current lengths of the job and dead letter streams.
    pub async fn depth(&self) -> QueueResult<QueueDepth> {
        let mut conn = self.conn().await?;
        let (jobs, dead_letters): (u64, u64) = redis::pipe()
            .cmd("XLEN")
            .arg(&self.config.stream_name)
            .cmd("XLEN")
            .arg(&self.config.dlq_stream_name)
            .query_async(&mut conn)
            .await?;
        Ok(QueueDepth { jobs, dead_letters })
    }

    /// Read new jobs for this consumer.
    /// Returns (message_id, job) pairs.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.conn().await?;

        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let entries = reply.keys.into_iter().flat_map(|k| k.ids).collect();
        Ok(self.decode_entries(entries).await)
    }

    /// Take over messages pending longer than the visibility timeout.
    /// These belong to consumers that died mid-job.
    pub async fn claim_stale(
        &self,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.conn().await?;

        let pending: StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;
        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let min_idle_ms = self.config.visibility_timeout.as_millis() as u64;
        let reply: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let jobs = self.decode_entries(reply.ids).await;
        if !jobs.is_empty() {
            info!("Claimed {} stale jobs", jobs.len());
        }
        Ok(jobs)
    }

    /// Decode stream entries into jobs. Entries whose payload does not parse
    /// are acked away so they cannot wedge the group.
    async fn decode_entries(&self, entries: Vec<StreamId>) -> Vec<(String, QueueJob)> {
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(payload) = entry.get::<String>(PAYLOAD_FIELD) else {
                warn!("Stream entry {} has no job payload, dropping", entry.id);
                self.ack(&entry.id).await.ok();
                continue;
            };
            match serde_json::from_str::<QueueJob>(&payload) {
                Ok(job) => {
                    debug!("Decoded job {} from entry {}", job.job_id(), entry.id);
                    jobs.push((entry.id, job));
                }
                Err(e) => {
                    warn!("Dropping malformed job payload in {}: {}", entry.id, e);
                    self.ack(&entry.id).await.ok();
                }
            }
        }
        jobs
    }

    /// Delivery attempts recorded for a message.
    pub async fn get_retry_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;
        let count: Option<u32> = conn.get(retry_key(message_id)).await?;
        Ok(count.unwrap_or(0))
    }

    /// Record one more delivery attempt for a message.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;
        let key = retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, RETRY_TTL_SECS).await?;
        Ok(count)
    }

    /// Drop the dedup reservation so the same source can be resubmitted.
    pub async fn clear_dedup(&self, idempotency_key: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(dedup_key(idempotency_key)).await?;
        Ok(())
    }

    /// Get max retries from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_namespaces_are_disjoint() {
        let d = dedup_key("package:anonymous:uploads/a.mp4");
        let r = retry_key("1700000000000-0");
        assert!(d.starts_with("vpack:dedup:"));
        assert!(r.starts_with("vpack:retry:"));
        assert_ne!(d, r);
    }

    #[test]
    fn config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "vpack:jobs");
        assert_eq!(config.dlq_stream_name, "vpack:dlq");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.visibility_timeout, Duration::from_secs(600));
    }
}
