//! Console report: run progress, token tables, comparisons and recall.
//!
//! Everything here writes to a caller-supplied `Write` (stdout in the
//! binary). Write errors on the console are not actionable and are ignored.

use std::io::Write;

use crate::backend::SessionHandle;
use crate::harness::{
    compare_runs, ComparisonError, ConversationConfig, ConversationResult, HarnessError,
    RecallReport, RunObserver, Turn,
};

/// Characters of the user message shown per turn.
pub const USER_PREVIEW_CHARS: usize = 200;
/// Characters of the assistant reply shown per turn.
pub const REPLY_PREVIEW_CHARS: usize = 500;

const RULE_WIDTH: usize = 80;

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// First `max_chars` characters of `text`, with `...` when cut.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// `1234567` → `1,234,567`.
pub(crate) fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn print_banner<W: Write>(out: &mut W, title: &str) {
    let rule = "=".repeat(RULE_WIDTH);
    let _ = writeln!(out, "\n{rule}\n{title}\n{rule}");
}

pub fn print_section<W: Write>(out: &mut W, title: &str) {
    let rule = "-".repeat(RULE_WIDTH);
    let _ = writeln!(out, "\n{title}\n{rule}");
}

// ─── Live Progress ───────────────────────────────────────────────────────────

/// Prints each turn as it happens.
pub struct ConsoleReporter<'a, W: Write + Send> {
    out: &'a mut W,
    track_tokens: bool,
    compaction_applied: bool,
}

impl<'a, W: Write + Send> ConsoleReporter<'a, W> {
    pub fn new(out: &'a mut W, track_tokens: bool, compaction_applied: bool) -> Self {
        Self {
            out,
            track_tokens,
            compaction_applied,
        }
    }
}

impl<W: Write + Send> RunObserver for ConsoleReporter<'_, W> {
    fn on_session_opened(&mut self, session: &SessionHandle, config: &ConversationConfig) {
        let _ = writeln!(self.out, "Session {} ({config})", session.id);
        if self.compaction_applied {
            let _ = writeln!(
                self.out,
                "Note: settings travel as session state `compaction`; the server app must read it for them to apply."
            );
        } else {
            let _ = writeln!(
                self.out,
                "Note: this backend keeps full history; compaction settings are not applied."
            );
        }
    }

    fn on_turn_started(&mut self, index: usize, message: &str) {
        let _ = writeln!(
            self.out,
            "\n[Turn {index}] User: {}",
            preview(message, USER_PREVIEW_CHARS)
        );
        let _ = self.out.flush();
    }

    fn on_turn_completed(&mut self, turn: &Turn) {
        let _ = writeln!(
            self.out,
            "[Turn {}] Agent: {}",
            turn.index,
            preview(&turn.assistant_response, REPLY_PREVIEW_CHARS)
        );
        if self.track_tokens {
            print_turn_tokens(self.out, turn);
        }
    }
}

pub fn print_turn_tokens<W: Write>(out: &mut W, turn: &Turn) {
    if turn.usage_reported {
        let _ = writeln!(
            out,
            "  tokens: prompt={} response={} total={} (cumulative prompt={})",
            thousands(turn.prompt_tokens),
            thousands(turn.response_tokens),
            thousands(turn.total_tokens),
            thousands(turn.cumulative_prompt_tokens)
        );
    } else {
        let _ = writeln!(out, "  tokens: not reported");
    }
}

// ─── Summaries ───────────────────────────────────────────────────────────────

/// Per-turn token table followed by run totals.
pub fn print_token_table<W: Write>(out: &mut W, result: &ConversationResult) {
    let rule = "-".repeat(60);
    let _ = writeln!(out, "\nTOKEN USAGE SUMMARY ({})", result.config());
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<6} {:>12} {:>12} {:>12} {:>14}",
        "Turn", "Prompt", "Response", "Total", "Cum. Prompt"
    );
    let _ = writeln!(out, "{rule}");
    for turn in result.turns() {
        let _ = writeln!(
            out,
            "{:<6} {:>12} {:>12} {:>12} {:>14}",
            turn.index,
            thousands(turn.prompt_tokens),
            thousands(turn.response_tokens),
            thousands(turn.total_tokens),
            thousands(turn.cumulative_prompt_tokens)
        );
    }
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "Total prompt tokens: {}  Total response tokens: {}",
        thousands(result.total_prompt_tokens()),
        thousands(result.total_response_tokens())
    );
    if !result.usage_reported() {
        let _ = writeln!(out, "(backend reported no usage; counts are zero)");
    }
    if result.cancelled() {
        let _ = writeln!(out, "(run cancelled after {} turns)", result.turns().len());
    }
}

/// Savings of `candidate` relative to `baseline`.
pub fn print_comparison<W: Write>(
    out: &mut W,
    baseline_label: &str,
    baseline: &ConversationResult,
    candidate_label: &str,
    candidate: &ConversationResult,
) {
    let _ = writeln!(out, "\nCOMPARISON: {baseline_label} vs {candidate_label}");
    for (label, result) in [(baseline_label, baseline), (candidate_label, candidate)] {
        let _ = writeln!(out, "  {label}:");
        let _ = writeln!(
            out,
            "    total prompt tokens: {}",
            thousands(result.total_prompt_tokens())
        );
        if let Some(last) = result.turns().last() {
            let _ = writeln!(
                out,
                "    final turn prompt tokens: {}",
                thousands(last.prompt_tokens)
            );
        }
    }

    match compare_runs(baseline, candidate) {
        Ok(cmp) if cmp.token_delta >= 0 => {
            let _ = writeln!(
                out,
                "  Saved: {} prompt tokens ({:.1}%)",
                thousands(cmp.token_delta.unsigned_abs()),
                cmp.token_delta_percent
            );
        }
        Ok(cmp) => {
            let _ = writeln!(
                out,
                "  Extra: {} prompt tokens ({:.1}%)",
                thousands(cmp.token_delta.unsigned_abs()),
                cmp.token_delta_percent.abs()
            );
        }
        Err(ComparisonError::DivisionUndefined { token_delta }) => {
            let _ = writeln!(
                out,
                "  Token delta: {token_delta} (percentage skipped: baseline reported no prompt tokens)"
            );
        }
    }
}

pub fn print_recall<W: Write>(out: &mut W, label: &str, report: &RecallReport) {
    if report.checked() == 0 {
        return;
    }
    let _ = writeln!(
        out,
        "Recall ({label}): {}/{} markers found",
        report.found.len(),
        report.checked()
    );
    if !report.missing.is_empty() {
        let _ = writeln!(out, "  missing: {}", report.missing.join(", "));
    }
}

/// A run failure, with a hint when the backend ran out of quota.
pub fn print_failure<W: Write>(out: &mut W, error: &HarnessError) {
    let _ = writeln!(out, "\nError: {error}");
    let quota = match error {
        HarnessError::Backend { source, .. } | HarnessError::SessionOpen { source, .. } => {
            source.is_quota_exhausted()
        }
        _ => false,
    };
    if quota {
        let _ = writeln!(out, "The backend is rate limiting requests; wait a minute and try again.");
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
