//! Progress events via Redis Pub/Sub.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vpack_models::{JobId, JobPhase};

use crate::error::QueueResult;

/// A single progress update within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressUpdate {
    /// The job entered a new lifecycle phase
    Phase { phase: JobPhase },
    /// Encoding progress for one rendition
    Rendition { rung: String, percent: u8 },
    /// Terminal failure
    Error { message: String },
    /// The job finished; outputs live under this prefix
    Done { output_prefix: String },
}

/// Progress event published to Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job ID
    pub job_id: JobId,
    /// The update
    pub update: ProgressUpdate,
}

/// Channel for publishing/subscribing to progress events.
#[derive(Clone)]
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("vpack:progress:{}", job_id)
    }

    /// Publish a progress event.
    pub async fn publish(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.job_id);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Publish a phase transition.
    pub async fn phase(&self, job_id: &JobId, phase: JobPhase) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            job_id: job_id.clone(),
            update: ProgressUpdate::Phase { phase },
        })
        .await
    }

    /// Publish per-rendition encoding progress.
    pub async fn rendition(&self, job_id: &JobId, rung: &str, percent: u8) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            job_id: job_id.clone(),
            update: ProgressUpdate::Rendition {
                rung: rung.to_string(),
                percent,
            },
        })
        .await
    }

    /// Publish error message.
    pub async fn error(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            job_id: job_id.clone(),
            update: ProgressUpdate::Error {
                message: message.into(),
            },
        })
        .await
    }

    /// Publish done message.
    pub async fn done(&self, job_id: &JobId, output_prefix: &str) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            job_id: job_id.clone(),
            update: ProgressUpdate::Done {
                output_prefix: output_prefix.to_string(),
            },
        })
        .await
    }

    /// Subscribe to progress events for a job.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_serialization_is_tagged() {
        let event = ProgressEvent {
            job_id: JobId::new(),
            update: ProgressUpdate::Rendition {
                rung: "720p".to_string(),
                percent: 42,
            },
        };
        let json = serde_json::to_string(&event).expect("serialize event");
        assert!(json.contains("\"kind\":\"rendition\""));
        assert!(json.contains("\"rung\":\"720p\""));

        let decoded: ProgressEvent = serde_json::from_str(&json).expect("deserialize event");
        match decoded.update {
            ProgressUpdate::Rendition { rung, percent } => {
                assert_eq!(rung, "720p");
                assert_eq!(percent, 42);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn channel_name_embeds_job_id() {
        let job_id = JobId::new();
        let name = ProgressChannel::channel_name(&job_id);
        assert_eq!(name, format!("vpack:progress:{}", job_id));
    }
}
