//! Harness error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur while running a conversation.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The run was rejected before any backend call.
    #[error("invalid conversation config: {reason}")]
    InvalidConfig { reason: String },

    /// The backend could not open a session.
    #[error("failed to open {backend} session: {source}")]
    SessionOpen {
        backend: String,
        source: BackendError,
    },

    /// The backend failed while handling a turn. No turn was recorded for it.
    #[error("turn {turn} failed: {source}")]
    Backend { turn: usize, source: BackendError },

    /// The backend reported a total smaller than the prompt count, so the
    /// response count cannot be derived.
    #[error(
        "turn {turn}: backend reported total_tokens={total_tokens} below prompt_tokens={prompt_tokens}"
    )]
    UsageContract {
        turn: usize,
        prompt_tokens: u64,
        total_tokens: u64,
    },
}

impl HarnessError {
    /// The 1-based turn the error belongs to, if it happened mid-run.
    pub fn turn(&self) -> Option<usize> {
        match self {
            HarnessError::Backend { turn, .. } | HarnessError::UsageContract { turn, .. } => Some(*turn),
            _ => None,
        }
    }
}

/// Errors from run comparison statistics. Never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComparisonError {
    /// The baseline run reported no prompt tokens, so no percentage exists.
    /// The absolute delta is still carried.
    #[error("percentage undefined: baseline run reported zero prompt tokens (delta {token_delta})")]
    DivisionUndefined { token_delta: i64 },
}
