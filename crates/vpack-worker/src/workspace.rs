//! Per-job scratch directories.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vpack_models::JobId;

use crate::error::WorkerResult;

/// Isolated scratch directory for one job.
///
/// Everything a job materializes locally lives under this root, so teardown
/// is a single recursive delete regardless of how far the job got.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    /// Create the workspace directory tree for a job.
    pub async fn create(work_dir: &Path, job_id: &JobId) -> WorkerResult<Self> {
        let root = work_dir.join(format!("job-{}", job_id));
        tokio::fs::create_dir_all(root.join("source")).await?;
        tokio::fs::create_dir_all(root.join("renditions")).await?;
        tokio::fs::create_dir_all(root.join("packaged")).await?;
        debug!("created workspace {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the downloaded source lands.
    ///
    /// Sources keep their original name but live under `source/`, so an
    /// upload named like one of the fixed output files cannot collide.
    pub fn source_path(&self, original_filename: &str) -> PathBuf {
        let name = Path::new(original_filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());
        self.root.join("source").join(name)
    }

    pub fn renditions_dir(&self) -> PathBuf {
        self.root.join("renditions")
    }

    pub fn packaged_dir(&self) -> PathBuf {
        self.root.join("packaged")
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.root.join("thumbnail.jpg")
    }

    pub fn audio_path(&self) -> PathBuf {
        self.root.join("audio.m4a")
    }

    /// Remove the workspace tree. Safe to call twice.
    pub async fn cleanup(&self) {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!("removed workspace {}", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove workspace {}: {}", self.root.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_cleanup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job_id = JobId::new();

        let ws = JobWorkspace::create(dir.path(), &job_id)
            .await
            .expect("create workspace");
        assert!(ws.renditions_dir().is_dir());
        assert!(ws.packaged_dir().is_dir());

        tokio::fs::write(ws.source_path("input.mp4"), b"data")
            .await
            .expect("write");

        ws.cleanup().await;
        assert!(!ws.root().exists());

        // Second cleanup is silent
        ws.cleanup().await;
    }

    #[tokio::test]
    async fn source_path_strips_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job_id = JobId::new();
        let ws = JobWorkspace::create(dir.path(), &job_id)
            .await
            .expect("create workspace");

        let path = ws.source_path("../../etc/passwd");
        assert_eq!(path, ws.root().join("source").join("passwd"));

        ws.cleanup().await;
    }

    #[tokio::test]
    async fn source_named_like_an_output_does_not_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job_id = JobId::new();
        let ws = JobWorkspace::create(dir.path(), &job_id)
            .await
            .expect("create workspace");

        let source = ws.source_path("thumbnail.jpg");
        assert_ne!(source, ws.thumbnail_path());
        assert_ne!(ws.source_path("audio.m4a"), ws.audio_path());

        // The source directory exists, so the download can land directly
        tokio::fs::write(&source, b"data").await.expect("write");
        assert!(source.is_file());
        assert!(!ws.thumbnail_path().exists());

        ws.cleanup().await;
    }
}
