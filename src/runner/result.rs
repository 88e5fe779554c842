//! Runner result types

use crate::core::outputs::JobOutputs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The runner itself could not be invoked for a job.
///
/// The engine treats this identically to a job failure, tagged with a
/// distinguishing reason; it never aborts the whole run.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn handler: {0}")]
    Spawn(String),

    #[error("handler produced unreadable output: {0}")]
    Output(String),
}

/// Terminal status reported by the runner for one job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Succeeded,
    Failed,
}

/// Result of one job execution at the runner boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// One success/failure bit; everything else is advisory
    pub status: JobStatus,

    /// Outputs to publish on success (ignored on failure)
    pub outputs: JobOutputs,

    /// Why the job failed, for `Failed` results
    pub reason: Option<String>,

    /// Opaque log reference, passed through untouched
    pub log_ref: Option<String>,
}

impl JobResult {
    pub fn succeeded(outputs: JobOutputs) -> Self {
        JobResult {
            status: JobStatus::Succeeded,
            outputs,
            reason: None,
            log_ref: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        JobResult {
            status: JobStatus::Failed,
            outputs: JobOutputs::new(),
            reason: Some(reason.into()),
            log_ref: None,
        }
    }

    pub fn with_log_ref(mut self, log_ref: impl Into<String>) -> Self {
        self.log_ref = Some(log_ref.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let ok = JobResult::succeeded(JobOutputs::new());
        assert_eq!(ok.status, JobStatus::Succeeded);
        assert!(ok.reason.is_none());

        let bad = JobResult::failed("timeout after 30s").with_log_ref("/tmp/log");
        assert_eq!(bad.status, JobStatus::Failed);
        assert_eq!(bad.reason.as_deref(), Some("timeout after 30s"));
        assert_eq!(bad.log_ref.as_deref(), Some("/tmp/log"));
    }
}
