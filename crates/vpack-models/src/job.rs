//! Job identifiers and pipeline phases.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a packaging job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phase of a job run inside the driver.
///
/// A run walks `Queued` through `Completed` in order. `Skipped` is a
/// non-error terminal reached when another worker already owns the job or
/// the output manifest already exists. `Failed` is reachable from any
/// non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Job received from the queue, nothing done yet
    #[default]
    Queued,
    /// Ownership lock held for the job's output location
    LockAcquired,
    /// Source input copied into the job workspace
    InputMaterialized,
    /// Rendition fan-out in flight
    Encoding,
    /// Segmentation produced manifests
    Packaged,
    /// Artifacts uploaded to the object store
    Published,
    /// Workspace torn down, lock released, job acknowledged
    Completed,
    /// Another worker owns this job, or it was already packaged
    Skipped,
    /// A fatal error occurred; job left un-acked for redelivery
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Queued => "queued",
            JobPhase::LockAcquired => "lock_acquired",
            JobPhase::InputMaterialized => "input_materialized",
            JobPhase::Encoding => "encoding",
            JobPhase::Packaged => "packaged",
            JobPhase::Published => "published",
            JobPhase::Completed => "completed",
            JobPhase::Skipped => "skipped",
            JobPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::Skipped | JobPhase::Failed
        )
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn terminal_phases() {
        assert!(JobPhase::Completed.is_terminal());
        assert!(JobPhase::Skipped.is_terminal());
        assert!(JobPhase::Failed.is_terminal());
        assert!(!JobPhase::Encoding.is_terminal());
        assert!(!JobPhase::Queued.is_terminal());
    }

    #[test]
    fn phase_serde_uses_snake_case() {
        let json = serde_json::to_string(&JobPhase::LockAcquired).unwrap();
        assert_eq!(json, "\"lock_acquired\"");
    }
}
