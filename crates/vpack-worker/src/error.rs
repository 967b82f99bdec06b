//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Input unavailable: {0}")]
    InputUnavailable(String),

    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    #[error("Packaging failed: {0}")]
    PackagingFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Metadata record failed: {0}")]
    MetadataFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vpack_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] vpack_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vpack_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn input_unavailable(msg: impl Into<String>) -> Self {
        Self::InputUnavailable(msg.into())
    }

    pub fn encode_failed(msg: impl Into<String>) -> Self {
        Self::EncodeFailed(msg.into())
    }

    pub fn packaging_failed(msg: impl Into<String>) -> Self {
        Self::PackagingFailed(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    pub fn metadata_failed(msg: impl Into<String>) -> Self {
        Self::MetadataFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Check if error is retryable.
    ///
    /// Transient infrastructure failures are worth redelivering; a source
    /// that encodes to garbage will do so again on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkerError::InputUnavailable(_)
                | WorkerError::PublishFailed(_)
                | WorkerError::MetadataFailed(_)
                | WorkerError::Storage(_)
                | WorkerError::Queue(_)
        )
    }
}
