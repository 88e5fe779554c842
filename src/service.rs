//! Run submission, status queries, and cancellation

use crate::core::graph::Pipeline;
use crate::core::state::{Run, RunSnapshot};
use crate::core::trigger::TriggerContext;
use crate::execution::{cancel_pair, CancelHandle, ExecutionEngine};
use crate::persistence::{PersistenceBackend, RunSummary};
use crate::runner::JobRunner;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown pipeline '{0}'")]
    UnknownPipeline(String),

    #[error("unknown run {0}")]
    UnknownRun(Uuid),

    #[error("trigger '{event}' does not match pipeline '{pipeline}'")]
    TriggerFiltered { pipeline: String, event: String },
}

struct RunEntry {
    snapshot_rx: watch::Receiver<RunSnapshot>,
    cancel: CancelHandle,
}

/// Front door for embedding the engine: registered pipelines, active and
/// finished runs, trigger gating.
///
/// Each submission spawns one engine task that exclusively owns its
/// `Run`; the service only ever observes watch-channel snapshots, so
/// status queries never contend with execution.
pub struct PipelineService<R> {
    runner: Arc<R>,
    pipelines: RwLock<HashMap<String, Arc<Pipeline>>>,
    runs: RwLock<HashMap<Uuid, RunEntry>>,
    store: Option<Arc<dyn PersistenceBackend>>,
}

impl<R: JobRunner + 'static> PipelineService<R> {
    pub fn new(runner: R) -> Self {
        PipelineService {
            runner: Arc::new(runner),
            pipelines: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Record finished runs through this backend
    pub fn with_store(mut self, store: Arc<dyn PersistenceBackend>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a validated pipeline under its name
    pub async fn register(&self, pipeline: Pipeline) {
        let mut pipelines = self.pipelines.write().await;
        pipelines.insert(pipeline.name.clone(), Arc::new(pipeline));
    }

    /// Create and start a run for a registered pipeline.
    ///
    /// The trigger gate is evaluated exactly once, here; a filtered
    /// trigger creates no run. Submission is not idempotent - every
    /// permitted trigger creates a fresh run.
    pub async fn submit(
        &self,
        pipeline_id: &str,
        trigger: TriggerContext,
    ) -> Result<Uuid, ServiceError> {
        let pipeline = {
            let pipelines = self.pipelines.read().await;
            pipelines
                .get(pipeline_id)
                .cloned()
                .ok_or_else(|| ServiceError::UnknownPipeline(pipeline_id.to_string()))?
        };

        if let Some(rule) = &pipeline.trigger {
            if !rule.permits(&trigger) {
                debug!(
                    pipeline = %pipeline.name,
                    event = %trigger.event,
                    "trigger filtered; no run created"
                );
                return Err(ServiceError::TriggerFiltered {
                    pipeline: pipeline.name.clone(),
                    event: trigger.event,
                });
            }
        }

        let mut run = Run::new(&pipeline, trigger);
        let run_id = run.run_id;

        let (cancel_handle, cancel_signal) = cancel_pair();
        let (snapshot_tx, snapshot_rx) = watch::channel(run.snapshot());

        let mut engine = ExecutionEngine::from_arc(Arc::clone(&self.runner));
        engine.set_status_channel(snapshot_tx);

        let store = self.store.clone();
        tokio::spawn(async move {
            let status = engine.execute(&pipeline, &mut run, cancel_signal).await;
            debug!(run_id = %run_id, status = status.as_str(), "run task finished");
            if let Some(store) = store {
                let summary = RunSummary::from_run(&run);
                if let Err(e) = store.save_run(&summary).await {
                    warn!(run_id = %run_id, "failed to persist run summary: {e:#}");
                }
            }
        });

        let mut runs = self.runs.write().await;
        runs.insert(
            run_id,
            RunEntry {
                snapshot_rx,
                cancel: cancel_handle,
            },
        );

        Ok(run_id)
    }

    /// Current snapshot of a run: per-job states, outputs of succeeded
    /// jobs, overall status.
    pub async fn run_status(&self, run_id: Uuid) -> Result<RunSnapshot, ServiceError> {
        let runs = self.runs.read().await;
        let entry = runs
            .get(&run_id)
            .ok_or(ServiceError::UnknownRun(run_id))?;
        let snapshot = entry.snapshot_rx.borrow().clone();
        Ok(snapshot)
    }

    /// Request cancellation of a run.
    ///
    /// Idempotent; cancelling an already-terminal run has no effect.
    pub async fn cancel(&self, run_id: Uuid) -> Result<(), ServiceError> {
        let runs = self.runs.read().await;
        let entry = runs
            .get(&run_id)
            .ok_or(ServiceError::UnknownRun(run_id))?;
        entry.cancel.cancel();
        Ok(())
    }

    /// Wait until the run reaches a terminal state and return its final
    /// snapshot.
    pub async fn wait(&self, run_id: Uuid) -> Result<RunSnapshot, ServiceError> {
        let mut rx = {
            let runs = self.runs.read().await;
            runs.get(&run_id)
                .ok_or(ServiceError::UnknownRun(run_id))?
                .snapshot_rx
                .clone()
        };

        loop {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.is_terminal() {
                return Ok(snapshot);
            }
            if rx.changed().await.is_err() {
                // Engine task finished; the last published snapshot is final.
                return Ok(rx.borrow().clone());
            }
        }
    }
}
