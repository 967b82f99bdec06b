//! Bounded fan-out of per-job work items.
//!
//! Every rendition encode and auxiliary extraction runs as its own task, all
//! gated by one process-wide semaphore so the machine never runs more
//! external encodes than configured, no matter how many jobs are in flight.
//! Results are aggregated all-or-nothing: one failed item fails the job, but
//! only after every sibling has settled.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::error;
use vpack_media::MediaError;
use vpack_models::{Ladder, RungSpec};

use crate::error::{WorkerError, WorkerResult};

/// One unit of parallel work within a job.
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// Encode one ladder rung
    Rung(RungSpec),
    /// Extract the poster frame
    Thumbnail,
    /// Extract the standalone audio track
    Audio,
}

impl WorkItem {
    pub fn name(&self) -> String {
        match self {
            WorkItem::Rung(rung) => rung.name.clone(),
            WorkItem::Thumbnail => "thumbnail".to_string(),
            WorkItem::Audio => "audio".to_string(),
        }
    }
}

/// Decide the work items for a job.
///
/// Every enabled rung and the thumbnail are always produced; the audio track
/// only when the job asks for it.
pub fn plan_items(ladder: &Ladder, extract_audio: bool) -> Vec<WorkItem> {
    let mut items: Vec<WorkItem> = ladder
        .enabled()
        .map(|rung| WorkItem::Rung(rung.clone()))
        .collect();
    items.push(WorkItem::Thumbnail);
    if extract_audio {
        items.push(WorkItem::Audio);
    }
    items
}

/// Settled result of one work item.
#[derive(Debug)]
pub struct ItemOutcome {
    pub name: String,
    pub result: Result<PathBuf, MediaError>,
}

/// Aggregated results of a fan-out.
#[derive(Debug)]
pub struct FanOutReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl FanOutReport {
    /// Names of the items that failed.
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.name.as_str())
            .collect()
    }

    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Artifact path produced by the named item, if it succeeded.
    pub fn artifact(&self, name: &str) -> Option<&PathBuf> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.result.as_ref().ok())
    }

    /// Collapse into a job-level result.
    ///
    /// Failures are logged per item so the aggregate error can stay short.
    pub fn into_result(self) -> WorkerResult<Self> {
        let failed = self.failed();
        if failed.is_empty() {
            return Ok(self);
        }

        for outcome in self.outcomes.iter().filter(|o| o.result.is_err()) {
            if let Err(e) = &outcome.result {
                error!(item = %outcome.name, "work item failed: {}", e);
            }
        }
        Err(WorkerError::encode_failed(format!(
            "{} of {} work items failed: {}",
            failed.len(),
            self.outcomes.len(),
            failed.join(", ")
        )))
    }
}

/// Run every item under the shared limiter and wait for all of them.
///
/// Each task acquires its permit inside the spawned task, before the work
/// future is polled, so the external process only starts once a slot is
/// actually held. Grants follow the semaphore's arrival order.
pub async fn run_items<F, Fut>(
    items: Vec<WorkItem>,
    limiter: Arc<Semaphore>,
    run: F,
) -> FanOutReport
where
    F: Fn(WorkItem) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<PathBuf, MediaError>> + Send + 'static,
{
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let name = item.name();
        let limiter = Arc::clone(&limiter);
        let run = run.clone();

        let handle = tokio::spawn(async move {
            let _permit = match limiter.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return ItemOutcome {
                        name,
                        result: Err(MediaError::internal("concurrency limiter closed")),
                    }
                }
            };
            let result = run(item).await;
            ItemOutcome { name, result }
        });
        handles.push(handle);
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => outcomes.push(ItemOutcome {
                name: "unknown".to_string(),
                result: Err(MediaError::internal(format!("work task panicked: {}", e))),
            }),
        }
    }

    FanOutReport { outcomes }
}
