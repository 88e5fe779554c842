use anyhow::{Context, Result};
use cascade::cli::commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use cascade::cli::output::*;
use cascade::cli::{Cli, Command};
use cascade::core::config::PipelineConfig;
use cascade::core::state::{JobState, Run, RunStatus};
use cascade::core::trigger::TriggerContext;
use cascade::execution::{cancel_pair, ExecutionEngine, ExecutionEvent};
use cascade::persistence::{InMemoryPersistence, PersistenceBackend, RunSummary, SqliteRunStore};
use cascade::runner::ProcessRunner;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::List(cmd) => list_pipelines(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    // Load pipeline document
    let config =
        PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;

    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let pipeline = config.into_pipeline()?;

    // Evaluate the trigger gate once, before any run exists
    let mut trigger = TriggerContext::new(&cmd.event);
    if let Some(branch) = &cmd.branch {
        trigger = trigger.with_branch(branch);
    }
    if let Some(commit) = &cmd.commit {
        trigger = trigger.with_commit(commit);
    }
    if let Some(rule) = &pipeline.trigger {
        if !rule.permits(&trigger) {
            println!(
                "{} Trigger '{}' does not match pipeline '{}'; no run created",
                WARN,
                style(&trigger.event).cyan(),
                style(&pipeline.name).bold()
            );
            return Ok(());
        }
    }

    // Set up persistence
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        Arc::new(SqliteRunStore::with_default_path().await?)
    };

    // Apply environment overrides to every handler invocation
    let mut base_env = HashMap::new();
    for (key, value) in &cmd.env {
        println!(
            "{} Environment override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
        base_env.insert(key.clone(), value.clone());
    }

    let runner = ProcessRunner::new().with_base_env(base_env);
    let mut engine = ExecutionEngine::new(runner);

    // Set up event handler for console output
    let progress = (!cli.verbose).then(|| create_progress_bar(pipeline.len()));
    {
        let progress = progress.clone();
        engine.add_event_handler(move |event| {
            let line = format_execution_event(&event);
            match &progress {
                Some(bar) => {
                    if let ExecutionEvent::JobStarted { job_id } = &event {
                        bar.set_message(job_id.clone());
                    }
                    if matches!(
                        event,
                        ExecutionEvent::JobSucceeded { .. }
                            | ExecutionEvent::JobFailed { .. }
                            | ExecutionEvent::JobSkipped { .. }
                    ) {
                        bar.inc(1);
                    }
                    bar.println(line);
                }
                None => println!("{}", line),
            }
        });
    }

    // Ctrl-C requests run-level cancellation
    let (cancel_handle, cancel_signal) = cancel_pair();
    {
        let handle = cancel_handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        });
    }

    // Execute the run
    let mut run = Run::new(&pipeline, trigger);
    println!();
    let status = engine.execute(&pipeline, &mut run, cancel_signal).await;

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    // Save to history
    if !cmd.no_history {
        let summary = RunSummary::from_run(&run);
        store.save_run(&summary).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    // Print final status
    match status {
        RunStatus::Succeeded => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
        }
        RunStatus::Cancelled => {
            println!(
                "\n{} {} {}",
                WARN,
                style(&pipeline.name).bold(),
                style("cancelled").yellow()
            );
            std::process::exit(130);
        }
        _ => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&pipeline.name).bold(),
                style("failed").red()
            );
            for (job_id, state) in run.job_states() {
                if let JobState::Failed { reason, .. } = state {
                    println!("  {}: {}", style(job_id).red(), style(reason).dim());
                }
            }
            std::process::exit(1);
        }
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let config = match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{e:#}")).red());
            std::process::exit(1);
        }
    };

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("{}", json);
    }

    match config.into_pipeline() {
        Ok(pipeline) => {
            println!("{} Pipeline is valid!", CHECK);
            println!("  Name: {}", style(&pipeline.name).bold());
            println!("  Jobs: {}", style(pipeline.len()).cyan());
            if pipeline.trigger.is_some() {
                println!("  Trigger gate: {}", style("present").cyan());
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{e:#}")).red());
            std::process::exit(1);
        }
    }
}

async fn list_pipelines(cmd: &ListCommand) -> Result<()> {
    let store = SqliteRunStore::with_default_path().await?;
    let pipelines = store.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(());
    }

    println!("{} Pipelines in history:", INFO);

    for pipeline_name in &pipelines {
        let runs = store.list_runs(pipeline_name).await?;

        if cmd.with_counts {
            let succeeded = runs
                .iter()
                .filter(|r| r.status == RunStatus::Succeeded)
                .count();
            let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(runs.len()).cyan(),
                style(succeeded).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let runs = store.list_runs(pipeline).await.ok();
            json_data.push(serde_json::json!({
                "name": pipeline,
                "run_count": runs.as_ref().map(|r| r.len()).unwrap_or(0)
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("\n{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = SqliteRunStore::with_default_path().await?;

    // If a specific run is requested
    if let Some(run_id_str) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id_str).context("Invalid run ID format")?;
        let summary = store.load_run(run_id).await?;

        match summary {
            Some(summary) => {
                print_run_details(&summary, cmd.verbose)?;
            }
            None => {
                println!("{} Run not found", WARN);
            }
        }
        return Ok(());
    }

    // List runs for one pipeline or across all
    let runs = if let Some(pipeline_name) = &cmd.pipeline {
        store.list_runs(pipeline_name).await?
    } else {
        let pipelines = store.list_pipelines().await?;
        let mut all_runs = Vec::new();
        for pipeline in &pipelines {
            all_runs.extend(store.list_runs(pipeline).await?);
        }
        all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all_runs
    };
    let runs: Vec<_> = runs.into_iter().take(cmd.limit).collect();

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, verbose: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(finished) = summary.finished_at {
        println!("  Finished: {}", style(finished.to_rfc3339()).dim());
        if let Ok(duration) = finished.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Jobs: {} total, {} succeeded, {} failed, {} skipped, {} cancelled",
        summary.total_jobs,
        style(summary.succeeded_jobs).green(),
        style(summary.failed_jobs).red(),
        style(summary.skipped_jobs).dim(),
        style(summary.cancelled_jobs).yellow()
    );

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
