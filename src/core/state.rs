//! Run and job state models

use crate::core::graph::Pipeline;
use crate::core::outputs::OutputStore;
use crate::core::trigger::TriggerContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use uuid::Uuid;

/// Overall status of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run has been created but not started
    Pending,
    /// Run is currently executing
    Running,
    /// Every job ended `Succeeded` or `Skipped`
    Succeeded,
    /// At least one job ended `Failed`
    Failed,
    /// Run was cancelled before natural termination
    Cancelled,
}

impl RunStatus {
    /// Check if the run can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(RunStatus::Pending),
            "Running" => Some(RunStatus::Running),
            "Succeeded" => Some(RunStatus::Succeeded),
            "Failed" => Some(RunStatus::Failed),
            "Cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }
}

/// State of a single job within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobState {
    /// Waiting for dependencies to reach a terminal state
    Pending,
    /// Condition evaluated true; about to be dispatched
    Ready,
    /// Dispatched to the runner
    Running { started_at: DateTime<Utc> },
    /// Runner reported success; outputs are committed
    Succeeded {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Runner reported failure, or the runner itself could not be invoked
    Failed {
        reason: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Condition evaluated false; the job never ran
    Skipped { reason: String },
    /// Aborted by run-level cancellation
    Cancelled,
}

impl JobState {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded { .. }
                | JobState::Failed { .. }
                | JobState::Skipped { .. }
                | JobState::Cancelled
        )
    }

    /// Time at which the job reached its terminal state, where one exists
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match self {
            JobState::Succeeded { finished_at, .. } => Some(*finished_at),
            JobState::Failed { failed_at, .. } => Some(*failed_at),
            _ => None,
        }
    }
}

/// One execution instance of a [`Pipeline`]
///
/// Mutable state is owned exclusively by the execution engine; everything
/// else observes runs through [`RunSnapshot`]s.
#[derive(Debug, Clone)]
pub struct Run {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub trigger: TriggerContext,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    job_states: HashMap<String, JobState>,
    pub outputs: OutputStore,
}

impl Run {
    /// Create a fresh run for a validated pipeline, all jobs `Pending`
    pub fn new(pipeline: &Pipeline, trigger: TriggerContext) -> Self {
        let job_states = pipeline
            .jobs()
            .map(|job| (job.id.clone(), JobState::Pending))
            .collect();

        Run {
            run_id: Uuid::new_v4(),
            pipeline_name: pipeline.name.clone(),
            trigger,
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
            job_states,
            outputs: OutputStore::new(),
        }
    }

    pub fn job_state(&self, job_id: &str) -> Option<&JobState> {
        self.job_states.get(job_id)
    }

    /// Iterate over `(job_id, state)` pairs
    pub fn job_states(&self) -> impl Iterator<Item = (&String, &JobState)> {
        self.job_states.iter()
    }

    /// True once every job is terminal
    pub fn is_settled(&self) -> bool {
        self.job_states.values().all(|s| s.is_terminal())
    }

    pub fn count_in(&self, pred: impl Fn(&JobState) -> bool) -> usize {
        self.job_states.values().filter(|s| pred(s)).count()
    }

    pub fn total_jobs(&self) -> usize {
        self.job_states.len()
    }

    pub(crate) fn begin(&mut self, now: DateTime<Utc>) {
        self.status = RunStatus::Running;
        self.started_at = Some(now);
    }

    pub(crate) fn set_ready(&mut self, job_id: &str) {
        self.set_state(job_id, JobState::Ready);
    }

    pub(crate) fn set_running(&mut self, job_id: &str, now: DateTime<Utc>) {
        self.set_state(job_id, JobState::Running { started_at: now });
    }

    pub(crate) fn set_succeeded(&mut self, job_id: &str, now: DateTime<Utc>) {
        let started_at = self.running_since(job_id).unwrap_or(now);
        self.set_state(
            job_id,
            JobState::Succeeded {
                started_at,
                finished_at: now,
            },
        );
    }

    pub(crate) fn set_failed(&mut self, job_id: &str, reason: String, now: DateTime<Utc>) {
        let started_at = self.running_since(job_id).unwrap_or(now);
        self.set_state(
            job_id,
            JobState::Failed {
                reason,
                started_at,
                failed_at: now,
            },
        );
    }

    pub(crate) fn set_skipped(&mut self, job_id: &str, reason: String) {
        self.set_state(job_id, JobState::Skipped { reason });
    }

    /// Mark every non-terminal job `Cancelled` and the run with it
    pub(crate) fn cancel_remaining(&mut self) {
        for state in self.job_states.values_mut() {
            if !state.is_terminal() {
                *state = JobState::Cancelled;
            }
        }
        self.status = RunStatus::Cancelled;
    }

    /// Derive the final run status from terminal job states
    pub(crate) fn finalize(&mut self, now: DateTime<Utc>) {
        if self.finished_at.is_none() {
            self.finished_at = Some(now);
        }
        if self.status == RunStatus::Cancelled {
            return;
        }
        let any_failed = self
            .job_states
            .values()
            .any(|s| matches!(s, JobState::Failed { .. }));
        self.status = if any_failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
    }

    /// Cloneable point-in-time view of the run
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id,
            pipeline_name: self.pipeline_name.clone(),
            status: self.status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            jobs: self
                .job_states
                .iter()
                .map(|(id, state)| (id.clone(), state.clone()))
                .collect(),
            outputs: self.outputs.to_sorted_map(),
        }
    }

    fn running_since(&self, job_id: &str) -> Option<DateTime<Utc>> {
        match self.job_states.get(job_id) {
            Some(JobState::Running { started_at }) => Some(*started_at),
            _ => None,
        }
    }

    fn set_state(&mut self, job_id: &str, state: JobState) {
        if let Some(slot) = self.job_states.get_mut(job_id) {
            *slot = state;
        }
    }
}

/// Immutable view of a run, as returned by status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-job state, keyed by job id
    pub jobs: BTreeMap<String, JobState>,
    /// Published outputs, present only for succeeded jobs
    pub outputs: BTreeMap<String, BTreeMap<String, String>>,
}

impl RunSnapshot {
    pub fn job_state(&self, job_id: &str) -> Option<&JobState> {
        self.jobs.get(job_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_is_terminal() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Ready.is_terminal());
        assert!(!JobState::Running {
            started_at: Utc::now()
        }
        .is_terminal());
        assert!(JobState::Succeeded {
            started_at: Utc::now(),
            finished_at: Utc::now()
        }
        .is_terminal());
        assert!(JobState::Failed {
            reason: "exit status 1".to_string(),
            started_at: Utc::now(),
            failed_at: Utc::now()
        }
        .is_terminal());
        assert!(JobState::Skipped {
            reason: "dependency 'a' failed".to_string()
        }
        .is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_run_status_round_trip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Succeeded,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("bogus"), None);
    }

    #[test]
    fn test_finalize_prefers_cancelled() {
        let pipeline = crate::core::test_support::linear_pipeline(&["a", "b"]);
        let mut run = Run::new(&pipeline, TriggerContext::new("manual"));
        run.begin(Utc::now());
        run.set_failed("a", "exit status 1".to_string(), Utc::now());
        run.cancel_remaining();
        run.finalize(Utc::now());
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.job_state("b"), Some(&JobState::Cancelled));
    }

    #[test]
    fn test_finalize_failed_wins_over_skipped() {
        let pipeline = crate::core::test_support::linear_pipeline(&["a", "b"]);
        let mut run = Run::new(&pipeline, TriggerContext::new("manual"));
        run.begin(Utc::now());
        run.set_failed("a", "exit status 1".to_string(), Utc::now());
        run.set_skipped("b", "dependency 'a' failed".to_string());
        assert!(run.is_settled());
        run.finalize(Utc::now());
        assert_eq!(run.status, RunStatus::Failed);
    }
}
