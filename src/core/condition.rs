//! Job run-condition model and evaluator

use crate::core::state::JobState;
use serde::{Deserialize, Serialize};

/// When a job is eligible to run, relative to its direct dependencies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Run only if every dependency succeeded (the default)
    #[default]
    OnSuccess,
    /// Run only if at least one dependency failed (compensating jobs)
    OnFailure,
    /// Run once dependencies are terminal, regardless of outcome
    Always,
}

/// Decide whether a job may run, given the terminal states of its direct
/// dependencies.
///
/// Callers must only pass terminal states; the scheduler guarantees this
/// by construction. A job with zero dependencies is vacuously eligible
/// under `OnSuccess` and `Always`, and never eligible under `OnFailure`.
pub fn eligible<'a, I>(condition: Condition, dep_states: I) -> bool
where
    I: IntoIterator<Item = &'a JobState>,
{
    match condition {
        Condition::OnSuccess => dep_states
            .into_iter()
            .all(|s| matches!(s, JobState::Succeeded { .. })),
        Condition::OnFailure => dep_states
            .into_iter()
            .any(|s| matches!(s, JobState::Failed { .. })),
        Condition::Always => true,
    }
}
