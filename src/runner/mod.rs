//! Job runner boundary
//!
//! All real work (tests, builds, deploys, rollbacks) happens behind the
//! [`JobRunner`] trait. The engine sees one success/failure bit and a
//! bounded map of named string outputs per execution; retry policy, if
//! any, lives inside a runner's handling of a single `execute` call.

pub mod process;
pub mod result;

use crate::core::job::JobSpec;
use crate::core::outputs::JobOutputs;
use async_trait::async_trait;
pub use process::ProcessRunner;
pub use result::{JobResult, JobStatus, RunnerError};

/// Executes one job and reports its terminal result.
///
/// `upstream` is the read-only merge of the outputs published by the
/// job's direct dependencies; the engine guarantees it is complete and
/// final by the time `execute` is called.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn execute(
        &self,
        job: &JobSpec,
        upstream: &JobOutputs,
    ) -> Result<JobResult, RunnerError>;
}
