//! Trigger metadata and submission gating

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata describing why a run was requested
///
/// Opaque pass-through for the engine; only the trigger gate inspects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerContext {
    /// Event type, e.g. "push", "pull_request", "manual"
    pub event: String,

    /// Branch the event refers to, if any
    pub branch: Option<String>,

    /// Commit identifier, if any
    pub commit: Option<String>,

    /// Additional opaque metadata
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl TriggerContext {
    pub fn new(event: impl Into<String>) -> Self {
        TriggerContext {
            event: event.into(),
            branch: None,
            commit: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }
}

/// Gate deciding whether a trigger creates a run at all
///
/// Evaluated exactly once, before the run exists. Branch filters are
/// anchored regexes: `release/.*` matches `release/1.2` but not
/// `old-release/1.2`.
#[derive(Debug, Clone)]
pub struct TriggerRule {
    events: Vec<String>,
    branch_filters: Vec<Regex>,
}

impl TriggerRule {
    /// Build a rule from event names and branch patterns.
    ///
    /// Empty lists mean "no constraint" for that dimension.
    pub fn new(events: Vec<String>, branches: Vec<String>) -> Result<Self, regex::Error> {
        let branch_filters = branches
            .iter()
            .map(|pattern| Regex::new(&format!("^(?:{pattern})$")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TriggerRule {
            events,
            branch_filters,
        })
    }

    pub fn permits(&self, ctx: &TriggerContext) -> bool {
        if !self.events.is_empty() && !self.events.iter().any(|e| e == &ctx.event) {
            return false;
        }
        if !self.branch_filters.is_empty() {
            let Some(branch) = &ctx.branch else {
                return false;
            };
            if !self.branch_filters.iter().any(|re| re.is_match(branch)) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_filter() {
        let rule = TriggerRule::new(vec!["push".to_string()], vec![]).unwrap();
        assert!(rule.permits(&TriggerContext::new("push")));
        assert!(!rule.permits(&TriggerContext::new("pull_request")));
    }

    #[test]
    fn test_branch_filter_is_anchored() {
        let rule = TriggerRule::new(
            vec![],
            vec!["main".to_string(), "release/.*".to_string()],
        )
        .unwrap();
        assert!(rule.permits(&TriggerContext::new("push").with_branch("main")));
        assert!(rule.permits(&TriggerContext::new("push").with_branch("release/1.2")));
        assert!(!rule.permits(&TriggerContext::new("push").with_branch("not-main")));
        assert!(!rule.permits(&TriggerContext::new("push").with_branch("old-release/1.2")));
    }

    #[test]
    fn test_branch_filter_requires_branch() {
        let rule = TriggerRule::new(vec![], vec!["main".to_string()]).unwrap();
        assert!(!rule.permits(&TriggerContext::new("push")));
    }

    #[test]
    fn test_empty_rule_permits_everything() {
        let rule = TriggerRule::new(vec![], vec![]).unwrap();
        assert!(rule.permits(&TriggerContext::new("anything").with_branch("any")));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(TriggerRule::new(vec![], vec!["release/(".to_string()]).is_err());
    }
}
