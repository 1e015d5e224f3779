//! Harness data model: run configuration, turn records and run results.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::errors::HarnessError;
use super::usage::TurnTokens;
use crate::backend::{CompactionSettings, SummarizerChoice};

// ─── Run Configuration ───────────────────────────────────────────────────────

/// Compaction parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationConfig {
    /// Completed turns between compactions. Must be at least 1.
    pub compaction_interval: u32,
    /// Most recent turns carried verbatim across a compaction.
    #[serde(default)]
    pub overlap_size: u32,
    #[serde(default)]
    pub summarizer: Option<SummarizerChoice>,
}

impl ConversationConfig {
    pub fn new(compaction_interval: u32, overlap_size: u32) -> Self {
        Self {
            compaction_interval,
            overlap_size,
            summarizer: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: SummarizerChoice) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Reject configs the framework cannot apply.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.compaction_interval == 0 {
            return Err(HarnessError::InvalidConfig {
                reason: "compaction_interval must be at least 1".into(),
            });
        }
        if self.overlap_size >= self.compaction_interval {
            return Err(HarnessError::InvalidConfig {
                reason: format!(
                    "overlap_size ({}) must be smaller than compaction_interval ({})",
                    self.overlap_size, self.compaction_interval
                ),
            });
        }
        if let Some(SummarizerChoice::Llm { model }) = &self.summarizer {
            if model.trim().is_empty() {
                return Err(HarnessError::InvalidConfig {
                    reason: "llm summarizer requires a model name".into(),
                });
            }
        }
        Ok(())
    }

    /// Whether a run of `turns` turns is long enough for a compaction to fire.
    pub fn compacts_within(&self, turns: usize) -> bool {
        turns as u64 >= u64::from(self.compaction_interval)
    }

    pub fn to_settings(&self) -> CompactionSettings {
        CompactionSettings {
            compaction_interval: self.compaction_interval,
            overlap_size: self.overlap_size,
            summarizer: self.summarizer.clone(),
        }
    }
}

impl From<&CompactionSettings> for ConversationConfig {
    fn from(settings: &CompactionSettings) -> Self {
        Self {
            compaction_interval: settings.compaction_interval,
            overlap_size: settings.overlap_size,
            summarizer: settings.summarizer.clone(),
        }
    }
}

impl std::fmt::Display for ConversationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "interval={} overlap={}",
            self.compaction_interval, self.overlap_size
        )?;
        if let Some(summarizer) = &self.summarizer {
            write!(f, " summarizer={summarizer}")?;
        }
        Ok(())
    }
}

/// Application and user under which sessions are opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub app_name: String,
    pub user_id: String,
}

impl SessionIdentity {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
        }
    }
}

// ─── Turn Records ────────────────────────────────────────────────────────────

/// One completed user/assistant exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// 1-based position in the run.
    pub index: usize,
    pub user_message: String,
    /// Text parts concatenated in arrival order.
    pub assistant_response: String,
    pub prompt_tokens: u64,
    pub response_tokens: u64,
    pub total_tokens: u64,
    pub cumulative_prompt_tokens: u64,
    pub cumulative_response_tokens: u64,
    /// False when the backend reported no usage at all for this turn.
    pub usage_reported: bool,
}

/// Outcome of one run. Built by the harness, read-only afterwards.
#[derive(Debug, Clone)]
pub struct ConversationResult {
    session_id: String,
    backend: String,
    config: ConversationConfig,
    turns: Vec<Turn>,
    total_prompt_tokens: u64,
    total_response_tokens: u64,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    cancelled: bool,
}

impl ConversationResult {
    pub(crate) fn started(
        session_id: impl Into<String>,
        backend: impl Into<String>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            backend: backend.into(),
            config,
            turns: Vec::new(),
            total_prompt_tokens: 0,
            total_response_tokens: 0,
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
        }
    }

    /// Append a completed turn and advance the cumulative counters.
    pub(crate) fn push_turn(
        &mut self,
        user_message: String,
        assistant_response: String,
        tokens: TurnTokens,
    ) -> &Turn {
        self.total_prompt_tokens = self.total_prompt_tokens.saturating_add(tokens.prompt);
        self.total_response_tokens = self.total_response_tokens.saturating_add(tokens.response);
        self.turns.push(Turn {
            index: self.turns.len() + 1,
            user_message,
            assistant_response,
            prompt_tokens: tokens.prompt,
            response_tokens: tokens.response,
            total_tokens: tokens.total,
            cumulative_prompt_tokens: self.total_prompt_tokens,
            cumulative_response_tokens: self.total_response_tokens,
            usage_reported: tokens.reported,
        });
        &self.turns[self.turns.len() - 1]
    }

    pub(crate) fn finalize(mut self, cancelled: bool) -> Self {
        self.finished_at = Some(Utc::now());
        self.cancelled = cancelled;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Name of the backend adapter that produced the run.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn total_prompt_tokens(&self) -> u64 {
        self.total_prompt_tokens
    }

    pub fn total_response_tokens(&self) -> u64 {
        self.total_response_tokens
    }

    /// Reply text of the last completed turn.
    pub fn final_response(&self) -> Option<&str> {
        self.turns.last().map(|t| t.assistant_response.as_str())
    }

    /// True when at least one turn carried a usage report.
    pub fn usage_reported(&self) -> bool {
        self.turns.iter().any(|t| t.usage_reported)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Wall-clock duration, once the run has finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    /// True when the run was interrupted before all messages were sent.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }
}

// ─── Derived Statistics ──────────────────────────────────────────────────────

/// Prompt-token difference between a baseline run `a` and a candidate `b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunComparison {
    /// `a.total_prompt - b.total_prompt`; positive means `b` used fewer tokens.
    pub token_delta: i64,
    /// `token_delta` as a percentage of `a.total_prompt`.
    pub token_delta_percent: f64,
}

/// Which recall markers appear in a run's final reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecallReport {
    pub found: Vec<String>,
    pub missing: Vec<String>,
}

impl RecallReport {
    pub fn all_recalled(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn checked(&self) -> usize {
        self.found.len() + self.missing.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(prompt: u64, response: u64) -> TurnTokens {
        TurnTokens {
            prompt,
            response,
            total: prompt + response,
            reported: true,
        }
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let err = ConversationConfig::new(0, 0).validate().unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig { .. }));
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_interval() {
        assert!(ConversationConfig::new(3, 3).validate().is_err());
        assert!(ConversationConfig::new(3, 2).validate().is_ok());
        assert!(ConversationConfig::new(1, 0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_summarizer_model() {
        let config = ConversationConfig::new(3, 1).with_summarizer(SummarizerChoice::Llm {
            model: "  ".into(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compacts_within() {
        let config = ConversationConfig::new(3, 1);
        assert!(!config.compacts_within(2));
        assert!(config.compacts_within(3));
        assert!(!ConversationConfig::new(100, 1).compacts_within(6));
    }

    #[test]
    fn test_settings_conversion_keeps_summarizer() {
        let config = ConversationConfig::new(5, 2).with_summarizer(SummarizerChoice::FrameworkDefault);
        let settings = config.to_settings();
        assert_eq!(settings.compaction_interval, 5);
        assert_eq!(settings.overlap_size, 2);
        assert_eq!(ConversationConfig::from(&settings), config);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConversationConfig::new(3, 1).to_string(), "interval=3 overlap=1");
    }

    #[test]
    fn test_deserialize_defaults_overlap() {
        let config: ConversationConfig = serde_yaml::from_str("compaction_interval: 4").unwrap();
        assert_eq!(config, ConversationConfig::new(4, 0));
    }

    #[test]
    fn test_push_turn_tracks_cumulative_counts() {
        let mut result = ConversationResult::started("s1", "scripted", ConversationConfig::new(3, 1));
        result.push_turn("a".into(), "A".into(), tokens(100, 10));
        result.push_turn("b".into(), "B".into(), tokens(150, 20));
        let last = result.push_turn("c".into(), "C".into(), tokens(90, 5)).clone();

        assert_eq!(last.index, 3);
        assert_eq!(last.cumulative_prompt_tokens, 340);
        assert_eq!(last.cumulative_response_tokens, 35);
        assert_eq!(result.total_prompt_tokens(), 340);
        assert_eq!(result.total_response_tokens(), 35);
        assert_eq!(result.final_response(), Some("C"));
        assert_eq!(
            result.turns().iter().map(|t| t.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_finalize_sets_timestamps_and_flag() {
        let result = ConversationResult::started("s1", "scripted", ConversationConfig::new(3, 1));
        assert!(result.finished_at().is_none());
        let result = result.finalize(true);
        assert!(result.cancelled());
        assert!(result.elapsed().is_some());
        assert!(result.final_response().is_none());
        assert!(!result.usage_reported());
    }
}
