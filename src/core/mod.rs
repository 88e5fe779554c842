//! Core domain models: jobs, graphs, conditions, run state, outputs

pub mod condition;
pub mod config;
pub mod graph;
pub mod job;
pub mod outputs;
pub mod state;
pub mod trigger;

pub use condition::{eligible, Condition};
pub use config::PipelineConfig;
pub use graph::{validate, Pipeline, ValidationError};
pub use job::{HandlerRef, JobSpec};
pub use outputs::{JobOutputs, OutputStore};
pub use state::{JobState, Run, RunSnapshot, RunStatus};
pub use trigger::{TriggerContext, TriggerRule};
