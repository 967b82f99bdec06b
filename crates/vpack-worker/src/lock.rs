//! Per-job ownership leases.
//!
//! A worker claims a job by atomically creating a lease file named after the
//! job. The lease carries its holder and a TTL so that a lease left behind by
//! a crashed process can be reclaimed instead of blocking the job forever.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vpack_models::JobId;

use crate::error::{WorkerError, WorkerResult};

/// Contents of a lease file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Lease {
    /// Identity of the worker holding the lease
    holder: String,
    /// When the lease was taken
    created_at: DateTime<Utc>,
    /// Seconds after which the lease is considered stale
    ttl_secs: u64,
}

impl Lease {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_seconds() >= self.ttl_secs as i64
    }
}

/// An acquired lease. Release is explicit so it can run on every exit path.
#[derive(Debug)]
pub struct OwnershipLock {
    path: PathBuf,
    job_id: JobId,
}

impl OwnershipLock {
    /// Remove the lease file. Releasing an already-released or never-created
    /// lease is a no-op.
    pub async fn release(self) -> WorkerResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(job_id = %self.job_id, "released job lease");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkerError::Io(e)),
        }
    }
}

/// Creates and reclaims job leases under a shared directory.
#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
    holder: String,
    ttl: Duration,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>, holder: impl Into<String>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            holder: holder.into(),
            ttl,
        }
    }

    /// Try to take ownership of a job.
    ///
    /// Returns `None` when another live worker holds the lease. A lease whose
    /// TTL has elapsed is treated as abandoned and taken over.
    pub async fn try_acquire(&self, job_id: &JobId) -> WorkerResult<Option<OwnershipLock>> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.lease_path(job_id);

        match self.create_lease(&path, job_id).await? {
            Some(lock) => Ok(Some(lock)),
            None => self.try_reclaim(&path, job_id).await,
        }
    }

    async fn create_lease(
        &self,
        path: &PathBuf,
        job_id: &JobId,
    ) -> WorkerResult<Option<OwnershipLock>> {
        let lease = Lease {
            holder: self.holder.clone(),
            created_at: Utc::now(),
            ttl_secs: self.ttl.as_secs(),
        };
        let payload = serde_json::to_vec(&lease)
            .map_err(|e| WorkerError::job_failed(format!("Failed to serialize lease: {}", e)))?;

        let mut open = tokio::fs::OpenOptions::new();
        open.write(true).create_new(true);

        match open.open(path).await {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                file.write_all(&payload).await?;
                debug!(job_id = %job_id, "acquired job lease");
                Ok(Some(OwnershipLock {
                    path: path.clone(),
                    job_id: job_id.clone(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(WorkerError::Io(e)),
        }
    }

    /// A lease file exists. Take it over only if its TTL has elapsed.
    async fn try_reclaim(
        &self,
        path: &PathBuf,
        job_id: &JobId,
    ) -> WorkerResult<Option<OwnershipLock>> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            // The holder released between our create attempt and this read;
            // one more create attempt settles it.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return self.create_lease(path, job_id).await;
            }
            Err(e) => return Err(WorkerError::Io(e)),
        };

        let expired = match serde_json::from_slice::<Lease>(&raw) {
            Ok(lease) => lease.is_expired(Utc::now()),
            Err(e) => {
                // An unreadable lease cannot prove a live holder.
                warn!(job_id = %job_id, "unreadable lease file, reclaiming: {}", e);
                true
            }
        };

        if !expired {
            debug!(job_id = %job_id, "job lease held elsewhere");
            return Ok(None);
        }

        info!(job_id = %job_id, "reclaiming expired job lease");
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(WorkerError::Io(e)),
        }
        self.create_lease(path, job_id).await
    }

    fn lease_path(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.lock", job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &std::path::Path, ttl: Duration) -> LockManager {
        LockManager::new(dir, "worker-test", ttl)
    }

    #[tokio::test]
    async fn second_acquire_loses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let locks = manager(dir.path(), Duration::from_secs(60));
        let job_id = JobId::new();

        let first = locks.try_acquire(&job_id).await.expect("acquire");
        assert!(first.is_some());

        let second = locks.try_acquire(&job_id).await.expect("acquire");
        assert!(second.is_none());

        first.unwrap().release().await.expect("release");

        let third = locks.try_acquire(&job_id).await.expect("acquire");
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn concurrent_acquire_has_one_winner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job_id = JobId::new();

        let mut handles = Vec::new();
        for i in 0..8 {
            let locks = LockManager::new(dir.path(), format!("worker-{i}"), Duration::from_secs(60));
            let job_id = job_id.clone();
            handles.push(tokio::spawn(async move {
                locks.try_acquire(&job_id).await.expect("acquire").is_some()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.expect("join") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job_id = JobId::new();

        let stale = manager(dir.path(), Duration::from_secs(0));
        let held = stale.try_acquire(&job_id).await.expect("acquire");
        assert!(held.is_some());

        // TTL of zero means the first lease is immediately stale.
        let fresh = manager(dir.path(), Duration::from_secs(60));
        let reclaimed = fresh.try_acquire(&job_id).await.expect("acquire");
        assert!(reclaimed.is_some());
    }

    #[tokio::test]
    async fn release_of_missing_file_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let locks = manager(dir.path(), Duration::from_secs(60));
        let job_id = JobId::new();

        let lock = locks.try_acquire(&job_id).await.expect("acquire").unwrap();
        tokio::fs::remove_file(dir.path().join(format!("{}.lock", job_id)))
            .await
            .expect("remove");

        lock.release().await.expect("release is a no-op");
    }
}
