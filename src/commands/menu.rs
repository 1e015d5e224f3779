//! Numbered menu over the scenarios.

use std::io::Write;

use tokio::io::{AsyncBufRead, Lines};
use tokio_util::sync::CancellationToken;

use super::interactive::run_interactive;
use super::report::print_failure;
use super::scenario::run_scenario;
use super::{numbered, read_line, run_scenarios, scenario_by_number, Input};
use crate::harness::{ConversationConfig, ConversationHarness};
use crate::scenarios::Scenario;

pub const INTERACTIVE_CHOICE: usize = 8;
pub const RUN_ALL_CHOICE: usize = 9;

fn print_menu<W: Write>(out: &mut W, scenarios: &[Scenario]) {
    let _ = writeln!(out, "\nSelect a scenario to run:");
    for (number, scenario) in numbered(scenarios) {
        if number == INTERACTIVE_CHOICE + 2 {
            let _ = writeln!(out, "  --- custom ---");
        }
        let _ = writeln!(out, "  {number}. {}", scenario.name);
        if number == scenarios.len().min(7) {
            let _ = writeln!(out, "  {INTERACTIVE_CHOICE}. Interactive Mode");
            let _ = writeln!(out, "  {RUN_ALL_CHOICE}. Run All Scenarios");
            let _ = writeln!(out, "  0. Exit");
        }
    }
}

/// Show the menu until the user exits, input ends or `cancel` fires.
///
/// Failures inside a choice are printed and the menu is shown again, so a
/// menu session exits with status 0 even after a failed run. Use `run` or
/// `run-all` when the exit status has to reflect failures.
pub async fn run_menu<R, W>(
    harness: &ConversationHarness,
    scenarios: &[Scenario],
    chat_config: &ConversationConfig,
    input: &mut Lines<R>,
    cancel: &CancellationToken,
    out: &mut W,
) where
    R: AsyncBufRead + Unpin,
    W: Write + Send,
{
    loop {
        print_menu(out, scenarios);
        let line = match read_line(input, "\nEnter your choice: ", cancel, out).await {
            Input::Line(line) => line,
            Input::Eof | Input::Cancelled => {
                let _ = writeln!(out, "\nExiting.");
                return;
            }
        };

        let choice = match line.trim().parse::<usize>() {
            Ok(choice) => choice,
            Err(_) => {
                let _ = writeln!(out, "Invalid choice. Please enter a number from the menu.");
                continue;
            }
        };

        let failure = match choice {
            0 => {
                let _ = writeln!(out, "Goodbye!");
                return;
            }
            INTERACTIVE_CHOICE => run_interactive(harness, chat_config, input, cancel, out)
                .await
                .err(),
            RUN_ALL_CHOICE => run_scenarios(harness, &numbered(scenarios), cancel, out)
                .await
                .err(),
            n => match scenario_by_number(scenarios, n) {
                Some(scenario) => run_scenario(harness, n, scenario, cancel, out)
                    .await
                    .err(),
                None => {
                    let _ = writeln!(out, "Invalid choice. Please enter a number from the menu.");
                    continue;
                }
            },
        };

        if let Some(e) = failure {
            tracing::error!(choice, error = %e, "menu choice failed");
            print_failure(out, &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt, BufReader};

    use super::*;
    use crate::backend::ConversationBackend;
    use crate::harness::test_support::ScriptedBackend;
    use crate::harness::SessionIdentity;
    use crate::scenarios::catalog;

    async fn drive(backend: Arc<ScriptedBackend>, script: &'static str) -> String {
        let harness = ConversationHarness::new(
            backend as Arc<dyn ConversationBackend>,
            SessionIdentity::new("app", "user"),
        );
        let mut input = BufReader::new(script.as_bytes()).lines();
        let mut out = Vec::new();
        run_menu(
            &harness,
            &catalog::builtin(),
            &ConversationConfig::new(3, 1),
            &mut input,
            &CancellationToken::new(),
            &mut out,
        )
        .await;
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_menu_lists_choices_and_exits() {
        let text = drive(Arc::new(ScriptedBackend::new()), "0\n").await;
        assert!(text.contains("  1. Basic Memory Retention"));
        assert!(text.contains("  7. Long Conversation + Token Tracking"));
        assert!(text.contains("  8. Interactive Mode"));
        assert!(text.contains("  9. Run All Scenarios"));
        assert!(text.contains("Goodbye!"));
    }

    #[tokio::test]
    async fn test_invalid_input_reprompts() {
        let backend = Arc::new(ScriptedBackend::new());
        let text = drive(Arc::clone(&backend), "abc\n42\n0\n").await;
        assert_eq!(text.matches("Invalid choice").count(), 2);
        assert_eq!(ScriptedBackend::count(&backend.sessions_created), 0);
    }

    #[tokio::test]
    async fn test_eof_exits() {
        let text = drive(Arc::new(ScriptedBackend::new()), "").await;
        assert!(text.contains("Exiting."));
    }

    #[tokio::test]
    async fn test_runs_selected_scenario() {
        let backend = Arc::new(ScriptedBackend::new());
        let text = drive(Arc::clone(&backend), "2\n0\n").await;
        assert!(text.contains("SCENARIO 2: Context Filling and Compaction"));
        assert_eq!(ScriptedBackend::count(&backend.messages_sent), 5);
    }

    #[tokio::test]
    async fn test_interactive_then_back_to_menu() {
        let backend = Arc::new(ScriptedBackend::new());
        let text = drive(Arc::clone(&backend), "8\nhello\nquit\n0\n").await;
        assert!(text.contains("INTERACTIVE MODE"));
        assert!(text.contains("Goodbye!"));
        assert_eq!(ScriptedBackend::count(&backend.messages_sent), 1);
    }

    #[tokio::test]
    async fn test_failure_is_printed_and_menu_continues() {
        let backend = Arc::new(ScriptedBackend::new().failing_session());
        let text = drive(backend, "1\n0\n").await;
        assert!(text.contains("Error: failed to open scripted session"));
        assert!(text.contains("Goodbye!"));
    }
}
