//! Structured job logging utilities.

use tracing::{error, info};
use vpack_models::JobId;

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Log the start of a job operation.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log the completion of a job operation.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    /// Log a terminal failure.
    pub fn log_failure(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job failed: {}", message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_carries_job_context() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "package_video");
        assert_eq!(logger.job_id, job_id.to_string());
        assert_eq!(logger.operation, "package_video");
    }
}
