//! Job specification model

use crate::core::condition::Condition;
use std::collections::HashMap;

/// Immutable specification of one job in a pipeline
///
/// Defined at authoring time; shared read-only across concurrent runs
/// once the owning pipeline has been validated.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    /// Unique job identifier within the pipeline
    pub id: String,

    /// Ids of jobs that must reach a terminal state before this one runs
    pub dependencies: Vec<String>,

    /// Eligibility condition evaluated against direct dependency outcomes
    pub condition: Condition,

    /// Output names this job may publish (validation only, not enforced)
    pub outputs_declared: Vec<String>,

    /// Opaque handler reference passed to the job runner
    pub handler: HandlerRef,
}

/// What the runner should execute for a job
///
/// The engine never interprets any of this; it is carried verbatim to the
/// runner boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerRef {
    /// Command or executable path
    pub command: String,

    /// Arguments passed to the command
    pub args: Vec<String>,

    /// Environment bindings for the handler
    pub env: HashMap<String, String>,

    /// Handler timeout in seconds; expiry is reported as a job failure
    pub timeout_secs: u64,
}

impl HandlerRef {
    pub fn new(command: impl Into<String>) -> Self {
        HandlerRef {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout_secs: 300,
        }
    }
}

impl JobSpec {
    /// Minimal spec with no dependencies and the default condition
    pub fn new(id: impl Into<String>, handler: HandlerRef) -> Self {
        JobSpec {
            id: id.into(),
            dependencies: Vec::new(),
            condition: Condition::default(),
            outputs_declared: Vec::new(),
            handler,
        }
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_outputs(mut self, names: &[&str]) -> Self {
        self.outputs_declared = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let job = JobSpec::new("unit-tests", HandlerRef::new("./scripts/test.sh"));
        assert_eq!(job.id, "unit-tests");
        assert!(job.dependencies.is_empty());
        assert_eq!(job.condition, Condition::OnSuccess);
        assert_eq!(job.handler.timeout_secs, 300);
    }

    #[test]
    fn test_builder_chain() {
        let job = JobSpec::new("rollback", HandlerRef::new("./scripts/rollback.sh"))
            .with_dependencies(&["deploy-production"])
            .with_condition(Condition::OnFailure)
            .with_outputs(&["restored_version"]);
        assert_eq!(job.dependencies, vec!["deploy-production"]);
        assert_eq!(job.condition, Condition::OnFailure);
        assert_eq!(job.outputs_declared, vec!["restored_version"]);
    }
}
