//! CLI output formatting

use crate::core::state::{JobState, RunStatus};
use crate::execution::ExecutionEvent;
use crate::persistence::RunSummary;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar sized to the pipeline's job count
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a job state for display
pub fn format_job_state(state: &JobState) -> String {
    match state {
        JobState::Pending => style("PENDING").dim().to_string(),
        JobState::Ready => style("READY").cyan().to_string(),
        JobState::Running { .. } => style("RUNNING").yellow().to_string(),
        JobState::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        JobState::Failed { reason, .. } => {
            format!("{} ({})", style("FAILED").red(), style(reason).dim())
        }
        JobState::Skipped { reason } => {
            format!("{} ({})", style("SKIPPED").dim(), style(reason).dim())
        }
        JobState::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format a run summary as a single history line
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Succeeded => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Cancelled => WARN,
        RunStatus::Pending => INFO,
    };

    format!(
        "{} {} - {} - {} ({}/{} succeeded, {} skipped)",
        status_icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.succeeded_jobs,
        summary.total_jobs,
        summary.skipped_jobs,
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline_name,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::JobStarted { job_id } => {
            format!("{} {}", SPINNER, style(job_id).cyan())
        }
        ExecutionEvent::JobSucceeded { job_id } => {
            format!("{} {}", CHECK, style(job_id).green())
        }
        ExecutionEvent::JobFailed { job_id, reason } => {
            format!("{} {}: {}", CROSS, style(job_id).red(), style(reason).dim())
        }
        ExecutionEvent::JobSkipped { job_id, reason } => {
            format!(
                "{} {} skipped ({})",
                INFO,
                style(job_id).dim(),
                style(reason).dim()
            )
        }
        ExecutionEvent::RunCancelled { run_id } => format!(
            "{} Run {} cancelled",
            WARN,
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::RunCompleted { run_id, status } => {
            let status_str = match status {
                RunStatus::Succeeded => {
                    format!("completed {}", style("successfully").green())
                }
                RunStatus::Failed => style("failed").red().to_string(),
                RunStatus::Cancelled => style("cancelled").yellow().to_string(),
                other => format!("{:?}", other),
            };
            format!(
                "{} Run ({}) {}",
                INFO,
                style(&run_id.to_string()[..8]).dim(),
                status_str
            )
        }
    }
}
