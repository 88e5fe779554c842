//! Readiness computation and skip propagation

use crate::core::condition::{eligible, Condition};
use crate::core::graph::Pipeline;
use crate::core::job::JobSpec;
use crate::core::state::{JobState, Run};
use tracing::debug;

/// Outcome of one scheduling pass over a run
#[derive(Debug, Default)]
pub(crate) struct SchedulePass {
    /// Jobs whose condition held; transitioned to `Ready`, dispatch next
    pub ready: Vec<String>,
    /// Jobs skipped this pass, with the reason recorded on their state
    pub skipped: Vec<(String, String)>,
}

/// Advance every candidate job to `Ready` or `Skipped`.
///
/// A candidate is a `Pending` job whose direct dependencies are all
/// terminal; its condition is evaluated against exactly that terminal
/// snapshot. Skips are contagious: a newly skipped job makes its own
/// dependents candidates, so the pass repeats until no further skip
/// occurs (`Ready` transitions cannot unlock anything by themselves).
pub(crate) fn advance(pipeline: &Pipeline, run: &mut Run) -> SchedulePass {
    let mut pass = SchedulePass::default();

    loop {
        let mut skipped_this_round = false;

        for id in pipeline.job_ids() {
            if !matches!(run.job_state(id), Some(JobState::Pending)) {
                continue;
            }
            let Some(job) = pipeline.job(id) else {
                continue;
            };

            let decision = {
                let mut dep_states = Vec::with_capacity(job.dependencies.len());
                let mut all_terminal = true;
                for dep in &job.dependencies {
                    match run.job_state(dep) {
                        Some(state) if state.is_terminal() => dep_states.push(state),
                        _ => {
                            all_terminal = false;
                            break;
                        }
                    }
                }
                if !all_terminal {
                    None
                } else if eligible(job.condition, dep_states) {
                    Some(Ok(()))
                } else {
                    Some(Err(skip_reason(job, run)))
                }
            };

            match decision {
                None => {}
                Some(Ok(())) => {
                    debug!(job_id = %id, "job eligible; marking ready");
                    run.set_ready(id);
                    pass.ready.push(id.clone());
                }
                Some(Err(reason)) => {
                    debug!(job_id = %id, %reason, "job ineligible; skipping");
                    run.set_skipped(id, reason.clone());
                    pass.skipped.push((id.clone(), reason));
                    skipped_this_round = true;
                }
            }
        }

        if !skipped_this_round {
            break;
        }
    }

    pass
}

/// Human-readable reason for a skip, naming the deciding dependency
fn skip_reason(job: &JobSpec, run: &Run) -> String {
    match job.condition {
        Condition::OnFailure => "no dependency failed".to_string(),
        _ => {
            for dep in &job.dependencies {
                match run.job_state(dep) {
                    Some(JobState::Failed { .. }) => {
                        return format!("dependency '{dep}' failed");
                    }
                    Some(JobState::Skipped { .. }) => {
                        return format!("dependency '{dep}' was skipped");
                    }
                    Some(JobState::Cancelled) => {
                        return format!("dependency '{dep}' was cancelled");
                    }
                    _ => {}
                }
            }
            "condition not met".to_string()
        }
    }
}
