//! Conversation harness: runs message sequences against a backend under a
//! given compaction config and records per-turn text and token usage.
//!
//! The harness never observes compaction directly. Its effect is visible
//! only through the prompt token counts the backend reports, which is what
//! [`compare_runs`] measures.

pub mod compare;
pub mod conversation;
pub mod errors;
pub mod types;
pub mod usage;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use compare::{check_recall, compare_runs};
pub use conversation::{ConversationHarness, ConversationRun, RunObserver, SilentObserver};
pub use errors::{ComparisonError, HarnessError};
pub use types::{
    ConversationConfig, ConversationResult, RecallReport, RunComparison, SessionIdentity, Turn,
};
pub use usage::{TurnTokens, UsageAccumulator};
