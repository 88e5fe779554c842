//! Shared test utilities
#![allow(dead_code)]

use async_trait::async_trait;
use cascade::core::condition::Condition;
use cascade::core::graph::Pipeline;
use cascade::core::job::{HandlerRef, JobSpec};
use cascade::core::outputs::JobOutputs;
use cascade::core::state::{JobState, Run, RunStatus};
use cascade::core::trigger::TriggerContext;
use cascade::execution::{cancel_pair, ExecutionEngine};
use cascade::runner::{JobResult, JobRunner, RunnerError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What the mock runner should do for one job
#[derive(Debug, Clone, Default)]
struct JobScript {
    fail_reason: Option<String>,
    infra_error: Option<String>,
    outputs: Vec<(String, String)>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct RunnerLog {
    starts: Vec<(String, Instant)>,
    finishes: Vec<(String, Instant)>,
    upstreams: HashMap<String, JobOutputs>,
}

/// Scripted [`JobRunner`] that records every invocation.
///
/// Unscripted jobs succeed with no outputs. Configure failures, published
/// outputs, delays, and infrastructure errors per job id before running.
#[derive(Debug, Default)]
pub struct MockRunner {
    scripts: HashMap<String, JobScript>,
    log: Mutex<RunnerLog>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, job_id: &str, reason: &str) -> Self {
        self.script(job_id).fail_reason = Some(reason.to_string());
        self
    }

    pub fn infra_error(mut self, job_id: &str, message: &str) -> Self {
        self.script(job_id).infra_error = Some(message.to_string());
        self
    }

    pub fn publish(mut self, job_id: &str, name: &str, value: &str) -> Self {
        self.script(job_id)
            .outputs
            .push((name.to_string(), value.to_string()));
        self
    }

    pub fn delay(mut self, job_id: &str, delay: Duration) -> Self {
        self.script(job_id).delay = Some(delay);
        self
    }

    fn script(&mut self, job_id: &str) -> &mut JobScript {
        self.scripts.entry(job_id.to_string()).or_default()
    }

    /// Whether the runner was ever invoked for this job
    pub fn invoked(&self, job_id: &str) -> bool {
        let log = self.log.lock().unwrap();
        log.starts.iter().any(|(id, _)| id == job_id)
    }

    pub fn invocation_count(&self) -> usize {
        self.log.lock().unwrap().starts.len()
    }

    /// When the runner began executing this job
    pub fn started_at(&self, job_id: &str) -> Option<Instant> {
        let log = self.log.lock().unwrap();
        log.starts
            .iter()
            .find(|(id, _)| id == job_id)
            .map(|(_, at)| *at)
    }

    /// When the runner finished executing this job
    pub fn finished_at(&self, job_id: &str) -> Option<Instant> {
        let log = self.log.lock().unwrap();
        log.finishes
            .iter()
            .find(|(id, _)| id == job_id)
            .map(|(_, at)| *at)
    }

    /// The upstream output view the job was handed
    pub fn upstream_seen(&self, job_id: &str) -> Option<JobOutputs> {
        let log = self.log.lock().unwrap();
        log.upstreams.get(job_id).cloned()
    }
}

#[async_trait]
impl JobRunner for MockRunner {
    async fn execute(
        &self,
        job: &JobSpec,
        upstream: &JobOutputs,
    ) -> Result<JobResult, RunnerError> {
        let script = self.scripts.get(&job.id).cloned().unwrap_or_default();

        {
            let mut log = self.log.lock().unwrap();
            log.starts.push((job.id.clone(), Instant::now()));
            log.upstreams.insert(job.id.clone(), upstream.clone());
        }

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut log = self.log.lock().unwrap();
            log.finishes.push((job.id.clone(), Instant::now()));
        }

        if let Some(message) = script.infra_error {
            return Err(RunnerError::Spawn(message));
        }
        if let Some(reason) = script.fail_reason {
            return Ok(JobResult::failed(reason));
        }
        Ok(JobResult::succeeded(script.outputs.into_iter().collect()))
    }
}

/// Job spec builder for tests
pub fn job(id: &str, deps: &[&str], condition: Condition) -> JobSpec {
    JobSpec::new(id, HandlerRef::new("true"))
        .with_dependencies(deps)
        .with_condition(condition)
}

/// Validated pipeline from job specs
pub fn pipeline(jobs: Vec<JobSpec>) -> Pipeline {
    Pipeline::new("test", jobs).expect("test pipeline must validate")
}

/// Drive one run to completion with the given runner
pub async fn execute_run(pipeline: &Pipeline, runner: Arc<MockRunner>) -> (RunStatus, Run) {
    let engine = ExecutionEngine::from_arc(runner);
    let mut run = Run::new(pipeline, TriggerContext::new("manual"));
    let (_handle, signal) = cancel_pair();
    let status = engine.execute(pipeline, &mut run, signal).await;
    (status, run)
}

pub fn assert_succeeded(run: &Run, job_id: &str) {
    assert!(
        matches!(run.job_state(job_id), Some(JobState::Succeeded { .. })),
        "expected '{}' to be Succeeded, got {:?}",
        job_id,
        run.job_state(job_id)
    );
}

pub fn assert_failed(run: &Run, job_id: &str) {
    assert!(
        matches!(run.job_state(job_id), Some(JobState::Failed { .. })),
        "expected '{}' to be Failed, got {:?}",
        job_id,
        run.job_state(job_id)
    );
}

pub fn assert_skipped(run: &Run, job_id: &str) {
    assert!(
        matches!(run.job_state(job_id), Some(JobState::Skipped { .. })),
        "expected '{}' to be Skipped, got {:?}",
        job_id,
        run.job_state(job_id)
    );
}

pub fn assert_cancelled(run: &Run, job_id: &str) {
    assert!(
        matches!(run.job_state(job_id), Some(JobState::Cancelled)),
        "expected '{}' to be Cancelled, got {:?}",
        job_id,
        run.job_state(job_id)
    );
}
