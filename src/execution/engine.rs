//! Execution engine - drives a single run to completion

use crate::core::graph::Pipeline;
use crate::core::state::{Run, RunSnapshot, RunStatus};
use crate::execution::scheduler;
use crate::runner::{JobResult, JobRunner, JobStatus, RunnerError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events emitted while a run executes
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
    },
    JobStarted {
        job_id: String,
    },
    JobSucceeded {
        job_id: String,
    },
    JobFailed {
        job_id: String,
        reason: String,
    },
    JobSkipped {
        job_id: String,
        reason: String,
    },
    RunCancelled {
        run_id: Uuid,
    },
    RunCompleted {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Create a linked cancellation handle/signal pair.
///
/// The handle side requests cancellation; the signal side is consumed by
/// the engine.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelSignal(rx))
}

/// Requests cancellation of one run
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Engine-side view of a cancellation request
#[derive(Debug)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested; never, if the handle is
    /// dropped without firing.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

type Completion = (String, Result<JobResult, RunnerError>);

/// Drives one run: computes readiness, dispatches eligible jobs to the
/// runner concurrently, applies completions one at a time, and settles
/// the run.
///
/// The engine is the sole mutator of `Run` state. Job bodies execute on
/// spawned worker tasks; their results come back over a single mpsc
/// channel, so no two state transitions ever race.
pub struct ExecutionEngine<R> {
    runner: Arc<R>,
    event_handlers: Vec<EventHandler>,
    status_tx: Option<watch::Sender<RunSnapshot>>,
}

impl<R: JobRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R) -> Self {
        Self::from_arc(Arc::new(runner))
    }

    pub fn from_arc(runner: Arc<R>) -> Self {
        Self {
            runner,
            event_handlers: Vec::new(),
            status_tx: None,
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Publish run snapshots after every applied transition
    pub fn set_status_channel(&mut self, tx: watch::Sender<RunSnapshot>) {
        self.status_tx = Some(tx);
    }

    fn emit(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    fn publish(&self, run: &Run) {
        if let Some(tx) = &self.status_tx {
            let _ = tx.send(run.snapshot());
        }
    }

    /// Execute the run until every job is terminal or cancellation fires.
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        run: &mut Run,
        mut cancel: CancelSignal,
    ) -> RunStatus {
        info!(
            run_id = %run.run_id,
            pipeline = %pipeline.name,
            jobs = pipeline.len(),
            "starting run"
        );
        run.begin(Utc::now());
        self.emit(ExecutionEvent::RunStarted {
            run_id: run.run_id,
            pipeline_name: pipeline.name.clone(),
        });
        self.publish(run);

        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
        let mut in_flight: HashMap<String, JoinHandle<()>> = HashMap::new();

        loop {
            if cancel.is_cancelled() {
                self.cancel_run(run, &mut in_flight);
                break;
            }

            let pass = scheduler::advance(pipeline, run);
            for (job_id, reason) in &pass.skipped {
                self.emit(ExecutionEvent::JobSkipped {
                    job_id: job_id.clone(),
                    reason: reason.clone(),
                });
            }

            for job_id in &pass.ready {
                let Some(job) = pipeline.job(job_id) else {
                    continue;
                };
                let upstream = run.outputs.upstream_for(job);
                run.set_running(job_id, Utc::now());
                self.emit(ExecutionEvent::JobStarted {
                    job_id: job_id.clone(),
                });

                let runner = Arc::clone(&self.runner);
                let job = job.clone();
                let tx = tx.clone();
                let handle = tokio::spawn(async move {
                    let result = runner.execute(&job, &upstream).await;
                    let _ = tx.send((job.id, result));
                });
                in_flight.insert(job_id.clone(), handle);
            }
            self.publish(run);

            if run.is_settled() {
                break;
            }

            if in_flight.is_empty() {
                // Unreachable on a validated DAG: nothing is running and
                // nothing became ready, yet the run is not settled.
                error!(run_id = %run.run_id, "scheduler made no progress; abandoning run");
                let stuck: Vec<String> = run
                    .job_states()
                    .filter(|(_, s)| !s.is_terminal())
                    .map(|(id, _)| id.clone())
                    .collect();
                for job_id in stuck {
                    run.set_skipped(&job_id, "scheduler made no progress".to_string());
                }
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.cancel_run(run, &mut in_flight);
                    break;
                }

                completion = rx.recv() => {
                    let Some((job_id, result)) = completion else {
                        break;
                    };
                    in_flight.remove(&job_id);
                    self.apply_completion(run, &job_id, result);
                    self.publish(run);
                }
            }
        }

        run.finalize(Utc::now());
        self.publish(run);
        info!(
            run_id = %run.run_id,
            status = run.status.as_str(),
            "run finished"
        );
        self.emit(ExecutionEvent::RunCompleted {
            run_id: run.run_id,
            status: run.status,
        });
        run.status
    }

    /// Apply one worker completion to run state
    fn apply_completion(
        &self,
        run: &mut Run,
        job_id: &str,
        result: Result<JobResult, RunnerError>,
    ) {
        let now = Utc::now();
        match result {
            Ok(result) => match result.status {
                JobStatus::Succeeded => {
                    debug!(job_id, "job succeeded");
                    run.outputs.commit(job_id, result.outputs);
                    run.set_succeeded(job_id, now);
                    self.emit(ExecutionEvent::JobSucceeded {
                        job_id: job_id.to_string(),
                    });
                }
                JobStatus::Failed => {
                    let reason = result
                        .reason
                        .unwrap_or_else(|| "handler reported failure".to_string());
                    warn!(job_id, %reason, "job failed");
                    run.set_failed(job_id, reason.clone(), now);
                    self.emit(ExecutionEvent::JobFailed {
                        job_id: job_id.to_string(),
                        reason,
                    });
                }
            },
            Err(e) => {
                // Runner infrastructure failure: treated as a job failure
                // with a distinguishing reason.
                let reason = format!("runner unavailable: {e}");
                warn!(job_id, %reason, "job failed");
                run.set_failed(job_id, reason.clone(), now);
                self.emit(ExecutionEvent::JobFailed {
                    job_id: job_id.to_string(),
                    reason,
                });
            }
        }
    }

    /// Cancel the run: every non-terminal job becomes `Cancelled` and
    /// in-flight workers are aborted (best-effort; the process runner
    /// kills its child on drop).
    fn cancel_run(&self, run: &mut Run, in_flight: &mut HashMap<String, JoinHandle<()>>) {
        info!(run_id = %run.run_id, "cancelling run");
        run.cancel_remaining();
        for (job_id, handle) in in_flight.drain() {
            debug!(job_id = %job_id, "aborting in-flight job");
            handle.abort();
        }
        self.emit(ExecutionEvent::RunCancelled { run_id: run.run_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::condition::Condition;
    use crate::core::job::{HandlerRef, JobSpec};
    use crate::core::outputs::JobOutputs;
    use crate::core::state::JobState;
    use crate::core::trigger::TriggerContext;
    use async_trait::async_trait;

    /// Runner that fails the configured jobs and succeeds the rest,
    /// publishing any configured outputs.
    struct ScriptedRunner {
        failures: Vec<String>,
        outputs: HashMap<String, JobOutputs>,
    }

    impl ScriptedRunner {
        fn succeeding() -> Self {
            ScriptedRunner {
                failures: Vec::new(),
                outputs: HashMap::new(),
            }
        }

        fn failing(job_ids: &[&str]) -> Self {
            ScriptedRunner {
                failures: job_ids.iter().map(|s| s.to_string()).collect(),
                outputs: HashMap::new(),
            }
        }
    }

    #[async_trait]
    impl JobRunner for ScriptedRunner {
        async fn execute(
            &self,
            job: &JobSpec,
            _upstream: &JobOutputs,
        ) -> Result<JobResult, RunnerError> {
            if self.failures.contains(&job.id) {
                Ok(JobResult::failed("exit status 1"))
            } else {
                Ok(JobResult::succeeded(
                    self.outputs.get(&job.id).cloned().unwrap_or_default(),
                ))
            }
        }
    }

    fn job(id: &str, deps: &[&str], condition: Condition) -> JobSpec {
        JobSpec::new(id, HandlerRef::new("true"))
            .with_dependencies(deps)
            .with_condition(condition)
    }

    #[tokio::test]
    async fn test_linear_run_succeeds() {
        let pipeline = Pipeline::new(
            "p",
            vec![
                job("a", &[], Condition::OnSuccess),
                job("b", &["a"], Condition::OnSuccess),
            ],
        )
        .unwrap();
        let mut run = Run::new(&pipeline, TriggerContext::new("manual"));

        let engine = ExecutionEngine::new(ScriptedRunner::succeeding());
        let (_handle, signal) = cancel_pair();
        let status = engine.execute(&pipeline, &mut run, signal).await;

        assert_eq!(status, RunStatus::Succeeded);
        assert!(matches!(
            run.job_state("b"),
            Some(JobState::Succeeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_skips_dependent_and_fails_run() {
        let pipeline = Pipeline::new(
            "p",
            vec![
                job("a", &[], Condition::OnSuccess),
                job("b", &["a"], Condition::OnSuccess),
            ],
        )
        .unwrap();
        let mut run = Run::new(&pipeline, TriggerContext::new("manual"));

        let engine = ExecutionEngine::new(ScriptedRunner::failing(&["a"]));
        let (_handle, signal) = cancel_pair();
        let status = engine.execute(&pipeline, &mut run, signal).await;

        assert_eq!(status, RunStatus::Failed);
        assert!(matches!(run.job_state("a"), Some(JobState::Failed { .. })));
        assert!(matches!(
            run.job_state("b"),
            Some(JobState::Skipped { .. })
        ));
    }

    #[tokio::test]
    async fn test_outputs_committed_only_on_success() {
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), {
            let mut m = JobOutputs::new();
            m.insert("version".to_string(), "1.2.3".to_string());
            m
        });
        let runner = ScriptedRunner {
            failures: vec!["b".to_string()],
            outputs,
        };

        let pipeline = Pipeline::new(
            "p",
            vec![
                job("a", &[], Condition::OnSuccess).with_outputs(&["version"]),
                job("b", &[], Condition::OnSuccess),
            ],
        )
        .unwrap();
        let mut run = Run::new(&pipeline, TriggerContext::new("manual"));

        let engine = ExecutionEngine::new(runner);
        let (_handle, signal) = cancel_pair();
        engine.execute(&pipeline, &mut run, signal).await;

        assert!(run.outputs.published_by("a").is_some());
        assert!(run.outputs.published_by("b").is_none());
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_dispatches_nothing() {
        let pipeline = Pipeline::new("p", vec![job("a", &[], Condition::OnSuccess)]).unwrap();
        let mut run = Run::new(&pipeline, TriggerContext::new("manual"));

        let engine = ExecutionEngine::new(ScriptedRunner::succeeding());
        let (handle, signal) = cancel_pair();
        handle.cancel();
        let status = engine.execute(&pipeline, &mut run, signal).await;

        assert_eq!(status, RunStatus::Cancelled);
        assert_eq!(run.job_state("a"), Some(&JobState::Cancelled));
    }
}
