//! Persistence layer for run history
//!
//! History of finished runs only; pending work never survives a process
//! restart.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::state::{JobState, Run, RunStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of one finished (or still-running) run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Run status at summary time
    pub status: RunStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution finished (if terminal)
    pub finished_at: Option<DateTime<Utc>>,

    /// Total number of jobs
    pub total_jobs: usize,

    /// Jobs that ended `Succeeded`
    pub succeeded_jobs: usize,

    /// Jobs that ended `Failed`
    pub failed_jobs: usize,

    /// Jobs that ended `Skipped`
    pub skipped_jobs: usize,

    /// Jobs that ended `Cancelled`
    pub cancelled_jobs: usize,
}

impl RunSummary {
    pub fn from_run(run: &Run) -> Self {
        RunSummary {
            run_id: run.run_id,
            pipeline_name: run.pipeline_name.clone(),
            status: run.status,
            started_at: run.started_at.unwrap_or_else(Utc::now),
            finished_at: run.finished_at,
            total_jobs: run.total_jobs(),
            succeeded_jobs: run.count_in(|s| matches!(s, JobState::Succeeded { .. })),
            failed_jobs: run.count_in(|s| matches!(s, JobState::Failed { .. })),
            skipped_jobs: run.count_in(|s| matches!(s, JobState::Skipped { .. })),
            cancelled_jobs: run.count_in(|s| matches!(s, JobState::Cancelled)),
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run summary
    async fn save_run(&self, summary: &RunSummary) -> Result<()>;

    /// Load a run summary by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List all runs for a pipeline, most recent first
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>>;

    /// List all pipeline names with recorded runs
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: tokio::sync::RwLock<std::collections::HashMap<Uuid, RunSummary>>,
    by_pipeline: tokio::sync::RwLock<std::collections::HashMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            by_pipeline: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, summary: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        let fresh = runs.insert(summary.run_id, summary.clone()).is_none();

        if fresh {
            let mut by_pipeline = self.by_pipeline.write().await;
            by_pipeline
                .entry(summary.pipeline_name.clone())
                .or_default()
                .push(summary.run_id);
        }

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let by_pipeline = self.by_pipeline.read().await;

        let mut result: Vec<RunSummary> = by_pipeline
            .get(pipeline_name)
            .map(|ids| ids.iter().filter_map(|id| runs.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let by_pipeline = self.by_pipeline.read().await;
        let mut names: Vec<String> = by_pipeline.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
