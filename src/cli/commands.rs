//! CLI command definitions

use clap::Args;

/// Execute a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Trigger event type
    #[arg(long, default_value = "manual")]
    pub event: String,

    /// Trigger branch
    #[arg(long)]
    pub branch: Option<String>,

    /// Trigger commit
    #[arg(long)]
    pub commit: Option<String>,

    /// Extra environment bindings for every handler (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a pipeline document
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List pipelines with recorded runs
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run by ID
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("ENVIRONMENT=staging"),
            Ok(("ENVIRONMENT".to_string(), "staging".to_string()))
        );
        assert_eq!(
            parse_key_value("URL=https://x.example/?a=1"),
            Ok(("URL".to_string(), "https://x.example/?a=1".to_string()))
        );
        assert!(parse_key_value("novalue").is_err());
    }
}
