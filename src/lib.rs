//! cascade - a DAG pipeline orchestration engine
//!
//! Validates a directed acyclic graph of jobs, schedules eligible jobs
//! concurrently, evaluates per-job run conditions against dependency
//! outcomes, propagates skips, passes named outputs downstream, and
//! invokes compensating jobs on upstream failure. All real work happens
//! behind the [`runner::JobRunner`] boundary.

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;
pub mod service;

// Re-export commonly used types
pub use core::{eligible, Condition, HandlerRef, JobSpec, Pipeline, PipelineConfig};
pub use core::{JobState, Run, RunSnapshot, RunStatus, ValidationError};
pub use core::{TriggerContext, TriggerRule};
pub use execution::{cancel_pair, CancelHandle, ExecutionEngine, ExecutionEvent};
pub use runner::{JobResult, JobRunner, JobStatus, ProcessRunner, RunnerError};
pub use service::{PipelineService, ServiceError};
