//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors from the external encoder and segmenter processes.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("MP4Box not found in PATH")]
    PackagerNotFound,

    #[error("encoder failed: {message}")]
    FfmpegFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("segmenter failed: {message}")]
    PackagerFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("probe failed: {0}")]
    ProbeFailed(String),

    #[error("no usable video encoder found")]
    NoUsableCodec,

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            exit_code,
        }
    }

    pub fn packager_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::PackagerFailed {
            message: message.into(),
            exit_code,
        }
    }

    pub fn probe_failed(message: impl Into<String>) -> Self {
        Self::ProbeFailed(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
