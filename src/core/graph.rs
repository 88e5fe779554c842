//! Pipeline graph model and load-time validation

use crate::core::job::JobSpec;
use crate::core::trigger::TriggerRule;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Why a candidate pipeline was rejected at load time
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("job '{job}' depends on unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("duplicate job id '{0}'")]
    DuplicateJobId(String),

    #[error("output '{name}' published by both '{first}' and '{second}', consumed by '{consumer}'")]
    DuplicateOutputName {
        consumer: String,
        name: String,
        first: String,
        second: String,
    },
}

/// A validated, immutable set of jobs forming a DAG
///
/// Construction runs [`validate`]; a `Pipeline` value therefore always
/// satisfies the graph invariants and may be shared read-only across
/// concurrent runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Gate evaluated at submission time, before any run exists
    pub trigger: Option<TriggerRule>,

    jobs: HashMap<String, JobSpec>,
    order: Vec<String>,
}

impl Pipeline {
    /// Build a pipeline from its job specifications.
    pub fn new(name: impl Into<String>, jobs: Vec<JobSpec>) -> Result<Self, ValidationError> {
        validate(&jobs)?;

        let order = topological_order(&jobs);
        let jobs = jobs.into_iter().map(|j| (j.id.clone(), j)).collect();

        Ok(Pipeline {
            name: name.into(),
            trigger: None,
            jobs,
            order,
        })
    }

    pub fn with_trigger(mut self, rule: TriggerRule) -> Self {
        self.trigger = Some(rule);
        self
    }

    pub fn job(&self, id: &str) -> Option<&JobSpec> {
        self.jobs.get(id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobSpec> {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    /// Job ids in deterministic topological order (dependencies first)
    pub fn job_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Validate a candidate job set.
///
/// Pure function with no side effects; validating the same input twice
/// yields the same result. Checks run in a fixed order: dependency
/// resolution, acyclicity (depth-first traversal with a recursion-stack
/// set), id uniqueness, then output-name collisions across each job's
/// direct dependencies.
pub fn validate(jobs: &[JobSpec]) -> Result<(), ValidationError> {
    let ids: HashSet<&str> = jobs.iter().map(|j| j.id.as_str()).collect();

    for job in jobs {
        for dep in &job.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    job: job.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let by_id: HashMap<&str, &JobSpec> = jobs.iter().map(|j| (j.id.as_str(), j)).collect();

    let mut roots: Vec<&str> = by_id.keys().copied().collect();
    roots.sort_unstable();

    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut stack = Vec::new();
    for id in roots {
        if let Some(path) = cycle_from(id, &by_id, &mut visited, &mut on_stack, &mut stack) {
            return Err(ValidationError::CycleDetected { path });
        }
    }

    let mut seen = HashSet::new();
    for job in jobs {
        if !seen.insert(job.id.as_str()) {
            return Err(ValidationError::DuplicateJobId(job.id.clone()));
        }
    }

    for job in jobs {
        let mut publishers: HashMap<&str, &str> = HashMap::new();
        for dep_id in &job.dependencies {
            let Some(dep) = by_id.get(dep_id.as_str()) else {
                continue;
            };
            for name in &dep.outputs_declared {
                if let Some(prev) = publishers.insert(name.as_str(), dep_id.as_str()) {
                    if prev != dep_id.as_str() {
                        return Err(ValidationError::DuplicateOutputName {
                            consumer: job.id.clone(),
                            name: name.clone(),
                            first: prev.to_string(),
                            second: dep_id.clone(),
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

/// Depth-first search from `id`; returns the cycle path if one closes.
///
/// `on_stack` is the recursion-stack set: a dependency already on it
/// means the current path loops back.
fn cycle_from(
    id: &str,
    by_id: &HashMap<&str, &JobSpec>,
    visited: &mut HashSet<String>,
    on_stack: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> Option<Vec<String>> {
    if on_stack.contains(id) {
        let start = stack.iter().position(|s| s == id).unwrap_or(0);
        let mut path: Vec<String> = stack[start..].to_vec();
        path.push(id.to_string());
        return Some(path);
    }
    if visited.contains(id) {
        return None;
    }

    stack.push(id.to_string());
    on_stack.insert(id.to_string());

    if let Some(job) = by_id.get(id) {
        for dep in &job.dependencies {
            if let Some(path) = cycle_from(dep, by_id, visited, on_stack, stack) {
                return Some(path);
            }
        }
    }

    stack.pop();
    on_stack.remove(id);
    visited.insert(id.to_string());
    None
}

/// Topological order over a validated (acyclic) job set, dependencies
/// first. Roots are visited in sorted id order so the result is stable.
fn topological_order(jobs: &[JobSpec]) -> Vec<String> {
    let by_id: HashMap<&str, &JobSpec> = jobs.iter().map(|j| (j.id.as_str(), j)).collect();
    let mut roots: Vec<&str> = by_id.keys().copied().collect();
    roots.sort_unstable();

    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(jobs.len());
    for id in roots {
        visit(id, &by_id, &mut visited, &mut order);
    }
    order
}

fn visit(
    id: &str,
    by_id: &HashMap<&str, &JobSpec>,
    visited: &mut HashSet<String>,
    order: &mut Vec<String>,
) {
    if visited.contains(id) {
        return;
    }
    visited.insert(id.to_string());

    if let Some(job) = by_id.get(id) {
        for dep in &job.dependencies {
            visit(dep, by_id, visited, order);
        }
    }

    order.push(id.to_string());
}
