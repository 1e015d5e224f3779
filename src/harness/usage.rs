//! Per-turn token accounting.
//!
//! Backends attach usage counters to some reply parts, often on the last one
//! only, and often only a subset of the counters. The accumulator merges
//! them field by field (latest reported value wins) and resolves the turn's
//! counters once the reply is complete:
//! - missing prompt/total counts are zero
//! - a missing response count is derived as `total - prompt` when both are known
//! - a derivation that would go negative is a contract violation, not clamped

use crate::backend::UsageReport;

/// Resolved token counters for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnTokens {
    pub prompt: u64,
    pub response: u64,
    pub total: u64,
    /// Whether the backend reported any counter for this turn.
    pub reported: bool,
}

/// The backend reported `total < prompt` with no response count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageContractViolation {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

/// Field-wise merge of the usage reports seen while a reply streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageAccumulator {
    prompt: Option<u64>,
    response: Option<u64>,
    total: Option<u64>,
}

impl UsageAccumulator {
    /// Fold one report in. Absent fields keep their previous value.
    pub fn merge(&mut self, report: &UsageReport) {
        if report.prompt_tokens.is_some() {
            self.prompt = report.prompt_tokens;
        }
        if report.response_tokens.is_some() {
            self.response = report.response_tokens;
        }
        if report.total_tokens.is_some() {
            self.total = report.total_tokens;
        }
    }

    /// Whether nothing has been reported yet.
    pub fn is_empty(&self) -> bool {
        self.prompt.is_none() && self.response.is_none() && self.total.is_none()
    }

    /// Resolve the final counters for the turn.
    pub fn resolve(&self) -> Result<TurnTokens, UsageContractViolation> {
        let response = match (self.response, self.total, self.prompt) {
            (Some(response), _, _) => response,
            (None, Some(total), Some(prompt)) => {
                total.checked_sub(prompt).ok_or(UsageContractViolation {
                    prompt_tokens: prompt,
                    total_tokens: total,
                })?
            }
            _ => 0,
        };

        Ok(TurnTokens {
            prompt: self.prompt.unwrap_or(0),
            response,
            total: self.total.unwrap_or(0),
            reported: !self.is_empty(),
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
