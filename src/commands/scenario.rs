//! Running scenarios and reporting their outcome.

use std::io::Write;

use tokio_util::sync::CancellationToken;

use super::report::{
    print_banner, print_comparison, print_recall, print_section, print_token_table,
    ConsoleReporter,
};
use crate::harness::{check_recall, ConversationHarness, ConversationResult, HarnessError};
use crate::scenarios::Scenario;

/// Results of the runs that completed, in scenario order.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub runs: Vec<(String, ConversationResult)>,
    pub cancelled: bool,
}

/// Run every config of `scenario` in order, printing progress and a summary.
///
/// A harness failure aborts the scenario and is returned to the caller.
pub async fn run_scenario<W: Write + Send>(
    harness: &ConversationHarness,
    number: usize,
    scenario: &Scenario,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<ScenarioOutcome, HarnessError> {
    print_banner(out, &format!("SCENARIO {number}: {}", scenario.name));
    if !scenario.description.is_empty() {
        let _ = writeln!(out, "{}", scenario.description);
    }
    tracing::info!(
        scenario = %scenario.name,
        runs = scenario.runs.len(),
        turns = scenario.messages.len(),
        "scenario started"
    );

    let mut outcome = ScenarioOutcome {
        runs: Vec::with_capacity(scenario.runs.len()),
        cancelled: false,
    };

    for run in &scenario.runs {
        print_section(out, &format!("Run: {}", run.label));
        if !run.config.compacts_within(scenario.messages.len()) {
            let _ = writeln!(
                out,
                "(interval {} cannot fire within {} turns)",
                run.config.compaction_interval,
                scenario.messages.len()
            );
        }

        let result = {
            let mut reporter =
                ConsoleReporter::new(out, scenario.track_tokens, harness.supports_compaction());
            harness
                .run_conversation_cancellable(&scenario.messages, &run.config, cancel, &mut reporter)
                .await?
        };

        if scenario.track_tokens || result.cancelled() {
            print_token_table(out, &result);
        }
        print_recall(out, &run.label, &check_recall(&result, &scenario.recall_markers));

        let cancelled = result.cancelled();
        outcome.runs.push((run.label.clone(), result));
        if cancelled {
            let _ = writeln!(out, "\nScenario interrupted.");
            outcome.cancelled = true;
            return Ok(outcome);
        }
    }

    if scenario.compares_runs() {
        if let Some(((base_label, baseline), rest)) = outcome.runs.split_first() {
            for (label, candidate) in rest {
                print_comparison(out, base_label, baseline, label, candidate);
            }
        }
    }

    let _ = writeln!(out, "\nScenario {number} complete.");
    Ok(outcome)
}
