//! Subprocess-backed job runner

use crate::core::job::JobSpec;
use crate::core::outputs::JobOutputs;
use crate::runner::result::{JobResult, RunnerError};
use crate::runner::JobRunner;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Cap on outputs accepted from a single handler
const MAX_OUTPUT_ENTRIES: usize = 64;
/// Cap on a single output value, in bytes
const MAX_OUTPUT_VALUE_BYTES: usize = 8 * 1024;

/// Handlers publish outputs by printing lines of this shape to stdout:
/// `::output name=value`
fn output_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^::output\s+([A-Za-z_][A-Za-z0-9_-]*)=(.*)$")
            .expect("output line pattern is valid")
    })
}

/// Executes a job's handler as a local subprocess.
///
/// Upstream outputs are injected as `CASCADE_INPUT_<NAME>` environment
/// variables, outputs are collected from `::output name=value` stdout
/// lines, and combined stdout/stderr is written to a log file whose path
/// becomes the opaque log reference. A timeout or non-zero exit becomes a
/// `Failed` result with a distinguished reason; only a failure to invoke
/// the handler at all surfaces as [`RunnerError`].
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Extra environment merged into every handler invocation
    base_env: HashMap<String, String>,
    /// Where handler logs are written; defaults to the system temp dir
    log_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_env(mut self, env: HashMap<String, String>) -> Self {
        self.base_env = env;
        self
    }

    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = Some(dir);
        self
    }

    fn log_path(&self, job_id: &str) -> PathBuf {
        let dir = self
            .log_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("cascade-logs"));
        dir.join(format!("{}-{}.log", job_id, uuid::Uuid::new_v4()))
    }
}

/// Environment variable name for an upstream output
fn input_env_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 14);
    key.push_str("CASCADE_INPUT_");
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            key.push(ch.to_ascii_uppercase());
        } else {
            key.push('_');
        }
    }
    key
}

/// Collect `::output name=value` lines, bounded in count and value size
fn parse_outputs(job_id: &str, stdout: &str) -> JobOutputs {
    let mut outputs = JobOutputs::new();
    for line in stdout.lines() {
        let Some(caps) = output_line().captures(line) else {
            continue;
        };
        if outputs.len() >= MAX_OUTPUT_ENTRIES {
            warn!(job_id, "output map full; ignoring further ::output lines");
            break;
        }
        let value = &caps[2];
        if value.len() > MAX_OUTPUT_VALUE_BYTES {
            warn!(job_id, name = &caps[1], "output value too large; dropped");
            continue;
        }
        outputs.insert(caps[1].to_string(), value.to_string());
    }
    outputs
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn execute(
        &self,
        job: &JobSpec,
        upstream: &JobOutputs,
    ) -> Result<JobResult, RunnerError> {
        let handler = &job.handler;
        debug!(job_id = %job.id, command = %handler.command, "spawning handler");

        let mut command = Command::new(&handler.command);
        command
            .args(&handler.args)
            .envs(&self.base_env)
            .envs(&handler.env)
            .env("CASCADE_JOB_ID", &job.id)
            .kill_on_drop(true);
        for (name, value) in upstream {
            command.env(input_env_key(name), value);
        }

        let timeout_duration = Duration::from_secs(handler.timeout_secs);
        let result = match timeout(timeout_duration, command.output()).await {
            Ok(output) => output,
            Err(_) => {
                warn!(job_id = %job.id, "handler timed out after {}s", handler.timeout_secs);
                return Ok(JobResult::failed(format!(
                    "timeout after {}s",
                    handler.timeout_secs
                )));
            }
        };

        let output = result.map_err(|e| RunnerError::Spawn(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let log_path = self.log_path(&job.id);
        let log_ref = match write_log(&log_path, &stdout, &stderr).await {
            Ok(()) => Some(log_path.display().to_string()),
            Err(e) => {
                warn!(job_id = %job.id, "failed to write handler log: {e}");
                None
            }
        };

        if output.status.success() {
            let outputs = parse_outputs(&job.id, &stdout);
            debug!(job_id = %job.id, outputs = outputs.len(), "handler succeeded");
            let mut result = JobResult::succeeded(outputs);
            result.log_ref = log_ref;
            Ok(result)
        } else {
            let code = output.status.code().unwrap_or(-1);
            let first_err = stderr.lines().next().unwrap_or("").trim();
            let reason = if first_err.is_empty() {
                format!("exit status {code}")
            } else {
                format!("exit status {code}: {first_err}")
            };
            warn!(job_id = %job.id, "handler failed: {reason}");
            let mut result = JobResult::failed(reason);
            result.log_ref = log_ref;
            Ok(result)
        }
    }
}

async fn write_log(path: &PathBuf, stdout: &str, stderr: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut contents = String::with_capacity(stdout.len() + stderr.len() + 32);
    contents.push_str(stdout);
    if !stderr.is_empty() {
        contents.push_str("\n--- stderr ---\n");
        contents.push_str(stderr);
    }
    tokio::fs::write(path, contents).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_env_key() {
        assert_eq!(input_env_key("image_tag"), "CASCADE_INPUT_IMAGE_TAG");
        assert_eq!(input_env_key("deploy-url"), "CASCADE_INPUT_DEPLOY_URL");
        assert_eq!(input_env_key("a.b"), "CASCADE_INPUT_A_B");
    }

    #[test]
    fn test_parse_outputs() {
        let stdout = "building...\n::output image_tag=v1.2.3\nnoise\n::output coverage=87\n";
        let outputs = parse_outputs("build", stdout);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs.get("image_tag").map(String::as_str), Some("v1.2.3"));
        assert_eq!(outputs.get("coverage").map(String::as_str), Some("87"));
    }

    #[test]
    fn test_parse_outputs_ignores_malformed_lines() {
        let stdout = "::output =nope\n::output\n:: output x=1\n::output ok=yes";
        let outputs = parse_outputs("job", stdout);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs.get("ok").map(String::as_str), Some("yes"));
    }

    #[test]
    fn test_parse_outputs_value_may_contain_equals() {
        let outputs = parse_outputs("job", "::output url=https://x.example/?a=1&b=2");
        assert_eq!(
            outputs.get("url").map(String::as_str),
            Some("https://x.example/?a=1&b=2")
        );
    }
}
