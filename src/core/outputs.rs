//! Per-run output store

use crate::core::job::JobSpec;
use std::collections::{BTreeMap, HashMap};

/// Named string outputs published by one job
pub type JobOutputs = HashMap<String, String>;

/// Outputs published by succeeded jobs during a single run
///
/// Committed only by the execution engine, and only for jobs that ended
/// `Succeeded`. Dependents observe a merged read-only view over their
/// direct dependencies; nothing propagates transitively unless an
/// intermediate job re-publishes it.
#[derive(Debug, Clone, Default)]
pub struct OutputStore {
    published: HashMap<String, JobOutputs>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a succeeded job's outputs
    pub(crate) fn commit(&mut self, job_id: &str, outputs: JobOutputs) {
        self.published.insert(job_id.to_string(), outputs);
    }

    /// Outputs published by one job, if it succeeded and published any
    pub fn published_by(&self, job_id: &str) -> Option<&JobOutputs> {
        self.published.get(job_id)
    }

    /// The merged view a job observes: every output published by its
    /// direct dependencies, keyed by output name.
    ///
    /// Name collisions across dependencies are rejected at validation
    /// time, so the merge is unambiguous.
    pub fn upstream_for(&self, job: &JobSpec) -> JobOutputs {
        let mut merged = JobOutputs::new();
        for dep in &job.dependencies {
            if let Some(outputs) = self.published.get(dep) {
                for (name, value) in outputs {
                    merged.insert(name.clone(), value.clone());
                }
            }
        }
        merged
    }

    /// Sorted copy for snapshots and JSON rendering
    pub fn to_sorted_map(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.published
            .iter()
            .map(|(job, outputs)| {
                (
                    job.clone(),
                    outputs
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                )
            })
            .collect()
    }
}
