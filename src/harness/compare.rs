//! Statistics derived from finished runs.

use super::errors::ComparisonError;
use super::types::{ConversationResult, RecallReport, RunComparison};

fn as_signed(tokens: u64) -> i64 {
    i64::try_from(tokens).unwrap_or(i64::MAX)
}

/// Prompt-token savings of run `b` relative to baseline run `a`.
///
/// Fails with [`ComparisonError::DivisionUndefined`] when `a` reported no
/// prompt tokens; the absolute delta is still carried in the error.
pub fn compare_runs(
    a: &ConversationResult,
    b: &ConversationResult,
) -> Result<RunComparison, ComparisonError> {
    let token_delta = as_signed(a.total_prompt_tokens()) - as_signed(b.total_prompt_tokens());

    if a.total_prompt_tokens() == 0 {
        return Err(ComparisonError::DivisionUndefined { token_delta });
    }

    Ok(RunComparison {
        token_delta,
        token_delta_percent: token_delta as f64 / a.total_prompt_tokens() as f64 * 100.0,
    })
}

/// Check which `markers` appear verbatim in the run's final reply.
///
/// A run with no completed turns reports every marker missing.
pub fn check_recall<S: AsRef<str>>(result: &ConversationResult, markers: &[S]) -> RecallReport {
    let reply = result.final_response().unwrap_or_default();
    let mut report = RecallReport::default();
    for marker in markers {
        let marker = marker.as_ref();
        if reply.contains(marker) {
            report.found.push(marker.to_string());
        } else {
            report.missing.push(marker.to_string());
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::types::ConversationConfig;
    use crate::harness::usage::TurnTokens;

    fn run_with(prompts: &[u64], final_reply: &str) -> ConversationResult {
        let mut result = ConversationResult::started("s", "scripted", ConversationConfig::new(3, 1));
        for (i, prompt) in prompts.iter().enumerate() {
            let reply = if i + 1 == prompts.len() { final_reply } else { "ok" };
            result.push_turn(
                format!("m{i}"),
                reply.to_string(),
                TurnTokens {
                    prompt: *prompt,
                    response: 1,
                    total: prompt + 1,
                    reported: true,
                },
            );
        }
        result.finalize(false)
    }

    #[test]
    fn test_compare_reports_savings() {
        let a = run_with(&[100, 200, 300, 400], "done");
        let b = run_with(&[100, 150, 150, 200], "done");
        let cmp = compare_runs(&a, &b).unwrap();
        assert_eq!(cmp.token_delta, 400);
        assert!((cmp.token_delta_percent - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_is_antisymmetric() {
        let a = run_with(&[120, 240], "x");
        let b = run_with(&[100, 110], "y");
        let ab = compare_runs(&a, &b).unwrap();
        let ba = compare_runs(&b, &a).unwrap();
        assert_eq!(ab.token_delta, -ba.token_delta);
        assert!(ba.token_delta_percent < 0.0);
    }

    #[test]
    fn test_compare_identical_runs() {
        let a = run_with(&[50, 60], "x");
        let cmp = compare_runs(&a, &a).unwrap();
        assert_eq!(cmp.token_delta, 0);
        assert_eq!(cmp.token_delta_percent, 0.0);
    }

    #[test]
    fn test_compare_zero_baseline_is_division_undefined() {
        let a = run_with(&[0, 0], "x");
        let b = run_with(&[10, 20], "y");
        assert_eq!(
            compare_runs(&a, &b).unwrap_err(),
            ComparisonError::DivisionUndefined { token_delta: -30 }
        );
        // The reverse direction is still defined.
        assert_eq!(compare_runs(&b, &a).unwrap().token_delta, 30);
    }

    #[test]
    fn test_recall_splits_found_and_missing() {
        let result = run_with(&[10, 20], "Your code is ALPHA-7392, and your name is Alice.");
        let report = check_recall(&result, &["ALPHA-7392", "Alice", "blue-ocean-42"]);
        assert_eq!(report.found, vec!["ALPHA-7392", "Alice"]);
        assert_eq!(report.missing, vec!["blue-ocean-42"]);
        assert!(!report.all_recalled());
        assert_eq!(report.checked(), 3);
    }

    #[test]
    fn test_recall_only_checks_final_reply() {
        let result = run_with(&[10, 20], "I don't remember.");
        // "ok" is in the first reply only.
        let report = check_recall(&result, &["ok"]);
        assert_eq!(report.missing, vec!["ok"]);
    }

    #[test]
    fn test_recall_without_turns() {
        let result = run_with(&[], "");
        let report = check_recall(&result, &["Alice"]);
        assert_eq!(report.missing, vec!["Alice"]);
        let none: [&str; 0] = [];
        assert!(check_recall(&result, &none).all_recalled());
    }
}
