//! Scenarios: named message sequences run under one or more compaction
//! configs, with recall markers to look for in the final reply.
//!
//! Seven scenarios are built in (see [`catalog`]). More can be loaded from a
//! YAML file:
//!
//! ```yaml
//! scenarios:
//!   - name: Short recall
//!     messages: ["My code is X-1.", "What is my code?"]
//!     runs:
//!       - label: aggressive
//!         compaction_interval: 2
//!         overlap_size: 1
//!     recall_markers: ["X-1"]
//! ```

pub mod catalog;

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::harness::ConversationConfig;

/// Errors from loading custom scenarios.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse scenarios: {reason}")]
    Parse { reason: String },

    #[error("scenario '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

/// One run of a scenario's messages under a specific config.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioRun {
    pub label: String,
    #[serde(flatten)]
    pub config: ConversationConfig,
}

impl ScenarioRun {
    pub fn new(label: impl Into<String>, compaction_interval: u32, overlap_size: u32) -> Self {
        Self {
            label: label.into(),
            config: ConversationConfig::new(compaction_interval, overlap_size),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub messages: Vec<String>,
    /// Runs in order. With two or more, the first is the comparison baseline.
    pub runs: Vec<ScenarioRun>,
    /// Strings expected in the final reply if early facts survived.
    #[serde(default)]
    pub recall_markers: Vec<String>,
    /// Print per-turn token counters and a token table for each run.
    #[serde(default)]
    pub track_tokens: bool,
}

impl Scenario {
    /// Check the scenario can run: messages present, at least one run, all
    /// run configs valid.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let invalid = |reason: String| ScenarioError::Invalid {
            name: self.name.clone(),
            reason,
        };
        if self.messages.is_empty() {
            return Err(invalid("no messages".into()));
        }
        if self.runs.is_empty() {
            return Err(invalid("no runs".into()));
        }
        for run in &self.runs {
            run.config
                .validate()
                .map_err(|e| invalid(format!("run '{}': {e}", run.label)))?;
        }
        Ok(())
    }

    /// Whether the runs should be compared against the first one.
    pub fn compares_runs(&self) -> bool {
        self.runs.len() > 1
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    scenarios: Vec<Scenario>,
}

/// Parse and validate scenarios from YAML text.
pub fn parse_scenarios(yaml: &str) -> Result<Vec<Scenario>, ScenarioError> {
    let file: ScenarioFile = serde_yaml::from_str(yaml).map_err(|e| ScenarioError::Parse {
        reason: e.to_string(),
    })?;
    for scenario in &file.scenarios {
        scenario.validate()?;
    }
    Ok(file.scenarios)
}

/// Load custom scenarios from a YAML file.
pub fn load_scenarios(path: &Path) -> Result<Vec<Scenario>, ScenarioError> {
    let content = std::fs::read_to_string(path).map_err(|e| ScenarioError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let scenarios = parse_scenarios(&content)?;
    tracing::info!(path = %path.display(), count = scenarios.len(), "loaded custom scenarios");
    Ok(scenarios)
}

/// Built-in scenarios followed by any loaded from `extra`.
pub fn all_scenarios(extra: Option<&Path>) -> Result<Vec<Scenario>, ScenarioError> {
    let mut scenarios = catalog::builtin();
    if let Some(path) = extra {
        scenarios.extend(load_scenarios(path)?);
    }
    Ok(scenarios)
}
