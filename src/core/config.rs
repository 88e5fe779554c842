//! Pipeline configuration from YAML

use crate::core::condition::Condition;
use crate::core::graph::Pipeline;
use crate::core::job::{HandlerRef, JobSpec};
use crate::core::trigger::TriggerRule;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Top-level pipeline document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Optional trigger gate ("on:" block)
    #[serde(default, rename = "on")]
    pub trigger: Option<TriggerRuleConfig>,

    /// Environment bindings merged into every job's handler
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Job defaults applied where a job omits the field
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Job definitions
    pub jobs: Vec<JobConfig>,
}

/// Trigger gate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRuleConfig {
    /// Event names that may create a run; empty means any event
    #[serde(default)]
    pub events: Vec<String>,

    /// Anchored branch patterns; empty means any branch
    #[serde(default)]
    pub branches: Vec<String>,
}

/// Document-level defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default handler timeout in seconds
    pub timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        DefaultsConfig { timeout_secs: 300 }
    }
}

/// One job as defined in the document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job identifier
    pub id: String,

    /// Ids of jobs this one needs finished first
    #[serde(default)]
    pub needs: Vec<String>,

    /// Run condition relative to dependency outcomes
    #[serde(default)]
    pub condition: Condition,

    /// Output names the job may publish
    #[serde(default)]
    pub outputs: Vec<String>,

    /// What to execute
    pub run: HandlerConfig,
}

/// Handler reference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Command or executable path
    pub command: String,

    /// Arguments passed to the command
    #[serde(default)]
    pub args: Vec<String>,

    /// Job-specific environment bindings (win over document-level `env`)
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Timeout override in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl PipelineConfig {
    /// Load a pipeline document from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!("failed to read pipeline file {}", path.as_ref().display())
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline document from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_yaml::from_str(yaml).context("failed to parse pipeline YAML")?;
        if config.jobs.is_empty() {
            anyhow::bail!("pipeline '{}' defines no jobs", config.name);
        }
        Ok(config)
    }

    /// Convert into a validated [`Pipeline`].
    ///
    /// Graph invariants (unique ids, resolvable dependencies, acyclicity,
    /// output-name collisions) are enforced here; a failing document never
    /// becomes a `Pipeline`.
    pub fn into_pipeline(self) -> Result<Pipeline> {
        let jobs: Vec<JobSpec> = self
            .jobs
            .iter()
            .map(|job| job.to_spec(&self.env, &self.defaults))
            .collect();

        let mut pipeline = Pipeline::new(self.name.clone(), jobs)
            .with_context(|| format!("pipeline '{}' failed validation", self.name))?;

        if let Some(trigger) = self.trigger {
            let rule = TriggerRule::new(trigger.events, trigger.branches)
                .context("invalid branch filter in trigger block")?;
            pipeline = pipeline.with_trigger(rule);
        }

        Ok(pipeline)
    }
}

impl JobConfig {
    fn to_spec(&self, global_env: &HashMap<String, String>, defaults: &DefaultsConfig) -> JobSpec {
        let mut env = global_env.clone();
        env.extend(self.run.env.clone());

        JobSpec {
            id: self.id.clone(),
            dependencies: self.needs.clone(),
            condition: self.condition,
            outputs_declared: self.outputs.clone(),
            handler: HandlerRef {
                command: self.run.command.clone(),
                args: self.run.args.clone(),
                env,
                timeout_secs: self.run.timeout_secs.unwrap_or(defaults.timeout_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE_YAML: &str = r#"
name: "Release"
on:
  events: [push]
  branches: ["main", "release/.*"]
env:
  ENVIRONMENT: production
defaults:
  timeout_secs: 120
jobs:
  - id: "unit-tests"
    run:
      command: "./scripts/run-tests.sh"
      args: ["--all"]
  - id: "build-image"
    needs: ["unit-tests"]
    outputs: ["image_tag"]
    run:
      command: "./scripts/build.sh"
  - id: "deploy-production"
    needs: ["build-image"]
    run:
      command: "./scripts/deploy.sh"
      env:
        ENVIRONMENT: production
      timeout_secs: 600
  - id: "rollback"
    needs: ["deploy-production"]
    condition: on_failure
    run:
      command: "./scripts/rollback.sh"
  - id: "notify"
    needs: ["deploy-production"]
    condition: always
    run:
      command: "./scripts/notify.sh"
"#;

    #[test]
    fn test_parse_release_document() {
        let config = PipelineConfig::from_yaml(RELEASE_YAML).unwrap();
        assert_eq!(config.name, "Release");
        assert_eq!(config.jobs.len(), 5);
        assert_eq!(config.jobs[3].condition, Condition::OnFailure);
        assert_eq!(config.jobs[4].condition, Condition::Always);
    }

    #[test]
    fn test_into_pipeline_applies_defaults_and_env() {
        let pipeline = PipelineConfig::from_yaml(RELEASE_YAML)
            .unwrap()
            .into_pipeline()
            .unwrap();

        let tests = pipeline.job("unit-tests").unwrap();
        assert_eq!(tests.handler.timeout_secs, 120);
        assert_eq!(
            tests.handler.env.get("ENVIRONMENT").map(String::as_str),
            Some("production")
        );

        let deploy = pipeline.job("deploy-production").unwrap();
        assert_eq!(deploy.handler.timeout_secs, 600);
    }

    #[test]
    fn test_trigger_block_becomes_rule() {
        let pipeline = PipelineConfig::from_yaml(RELEASE_YAML)
            .unwrap()
            .into_pipeline()
            .unwrap();
        let rule = pipeline.trigger.as_ref().unwrap();

        use crate::core::trigger::TriggerContext;
        assert!(rule.permits(&TriggerContext::new("push").with_branch("main")));
        assert!(!rule.permits(&TriggerContext::new("pull_request").with_branch("main")));
        assert!(!rule.permits(&TriggerContext::new("push").with_branch("feature/x")));
    }

    #[test]
    fn test_empty_jobs_rejected() {
        let yaml = r#"
name: "Empty"
jobs: []
"#;
        assert!(PipelineConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_dependency_rejected_at_conversion() {
        let yaml = r#"
name: "Broken"
jobs:
  - id: "b"
    needs: ["a"]
    run:
      command: "true"
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let err = config.into_pipeline().unwrap_err();
        assert!(err.to_string().contains("failed validation"));
    }

    #[test]
    fn test_condition_defaults_to_on_success() {
        let yaml = r#"
name: "Defaults"
jobs:
  - id: "only"
    run:
      command: "true"
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.jobs[0].condition, Condition::OnSuccess);
    }
}
