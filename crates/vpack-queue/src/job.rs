//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vpack_models::JobId;

/// Job to package an uploaded video into adaptive streaming renditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageVideoJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Object key of the uploaded source
    pub source_key: String,
    /// Original filename as uploaded, used for the metadata record
    pub original_filename: String,
    /// Also publish a standalone audio track
    #[serde(default)]
    pub extract_audio: bool,
    /// Owning user, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Logical parent (e.g. upload batch) the output is grouped under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl PackageVideoJob {
    /// Create a new packaging job.
    pub fn new(source_key: impl Into<String>, original_filename: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            source_key: source_key.into(),
            original_filename: original_filename.into(),
            extract_audio: false,
            owner_id: None,
            parent_id: None,
            created_at: Utc::now(),
        }
    }

    /// Also extract a standalone audio track.
    pub fn with_audio(mut self, extract: bool) -> Self {
        self.extract_audio = extract;
        self
    }

    /// Set the owning user.
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Set the parent grouping ID.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Generate idempotency key for deduplication.
    ///
    /// Two submissions of the same source by the same owner map to one key,
    /// regardless of the job IDs minted for them.
    pub fn idempotency_key(&self) -> String {
        format!(
            "package:{}:{}",
            self.owner_id.as_deref().unwrap_or("anonymous"),
            self.source_key
        )
    }

    /// Object key prefix all published artifacts for this job land under.
    pub fn output_prefix(&self) -> String {
        let stem = std::path::Path::new(&self.source_key)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_key.clone());

        let mut prefix = String::from("packaged");
        if let Some(owner) = &self.owner_id {
            prefix.push('/');
            prefix.push_str(&sanitize_component(owner));
        }
        if let Some(parent) = &self.parent_id {
            prefix.push('/');
            prefix.push_str(&sanitize_component(parent));
        }
        prefix.push('/');
        prefix.push_str(&sanitize_component(&stem));
        prefix
    }
}

/// Restrict a key component to filesystem- and URL-safe characters.
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Package an uploaded video into adaptive streaming output
    PackageVideo(PackageVideoJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::PackageVideo(j) => &j.job_id,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::PackageVideo(j) => j.idempotency_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_job_serde_roundtrip() {
        let job = PackageVideoJob::new("uploads/raw/talk.mp4", "talk.mp4")
            .with_audio(true)
            .with_owner("user_1");

        let wrapper = QueueJob::PackageVideo(job.clone());
        let json = serde_json::to_string(&wrapper).expect("serialize QueueJob");
        assert!(json.contains("\"type\":\"package_video\""));

        let decoded: QueueJob = serde_json::from_str(&json).expect("deserialize QueueJob");
        let QueueJob::PackageVideo(j) = decoded;
        assert_eq!(j.job_id, job.job_id);
        assert_eq!(j.source_key, job.source_key);
        assert!(j.extract_audio);
        assert_eq!(j.owner_id.as_deref(), Some("user_1"));
        assert_eq!(j.parent_id, None);
        assert_eq!(j.created_at, job.created_at);
    }

    #[test]
    fn idempotency_key_ignores_job_id() {
        let a = PackageVideoJob::new("uploads/raw/talk.mp4", "talk.mp4").with_owner("user_1");
        let b = PackageVideoJob::new("uploads/raw/talk.mp4", "talk.mp4").with_owner("user_1");
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.idempotency_key(), b.idempotency_key());

        let anon = PackageVideoJob::new("uploads/raw/talk.mp4", "talk.mp4");
        assert_eq!(anon.idempotency_key(), "package:anonymous:uploads/raw/talk.mp4");
    }

    #[test]
    fn output_prefix_nests_owner_and_parent() {
        let job = PackageVideoJob::new("uploads/raw/My Talk (final).mp4", "My Talk (final).mp4")
            .with_owner("user_1")
            .with_parent("batch/7");
        assert_eq!(
            job.output_prefix(),
            "packaged/user_1/batch-7/My-Talk--final-"
        );

        let bare = PackageVideoJob::new("talk.mp4", "talk.mp4");
        assert_eq!(bare.output_prefix(), "packaged/talk");
    }
}
