//! Console commands: numbered menu, interactive chat, scenario runs and the
//! report printing they share.
//!
//! Scenario numbers: built-ins are `1..=7`, custom scenarios start at `10`
//! (`8` and `9` are the interactive and run-all menu entries).

pub mod interactive;
pub mod menu;
pub mod report;
pub mod scenario;

use std::io::Write;

use tokio::io::{AsyncBufRead, Lines};
use tokio_util::sync::CancellationToken;

use crate::harness::{ConversationHarness, HarnessError};
use crate::scenarios::Scenario;

const BUILTIN_COUNT: usize = 7;
const CUSTOM_OFFSET: usize = 10;

/// Menu/CLI number of the scenario at `index`.
pub fn scenario_number(index: usize) -> usize {
    if index < BUILTIN_COUNT {
        index + 1
    } else {
        index - BUILTIN_COUNT + CUSTOM_OFFSET
    }
}

pub fn scenario_by_number(scenarios: &[Scenario], number: usize) -> Option<&Scenario> {
    let index = match number {
        1..=BUILTIN_COUNT => number - 1,
        n if n >= CUSTOM_OFFSET => n - CUSTOM_OFFSET + BUILTIN_COUNT,
        _ => return None,
    };
    scenarios.get(index)
}

/// Every scenario paired with its number.
pub fn numbered(scenarios: &[Scenario]) -> Vec<(usize, &Scenario)> {
    scenarios
        .iter()
        .enumerate()
        .map(|(i, s)| (scenario_number(i), s))
        .collect()
}

/// Resolve scenario numbers, failing on the first unknown one.
pub fn select_scenarios<'a>(
    scenarios: &'a [Scenario],
    numbers: &[usize],
) -> Result<Vec<(usize, &'a Scenario)>, usize> {
    numbers
        .iter()
        .map(|&n| scenario_by_number(scenarios, n).map(|s| (n, s)).ok_or(n))
        .collect()
}

pub fn list_scenarios<W: Write>(out: &mut W, scenarios: &[Scenario]) {
    for (number, scenario) in numbered(scenarios) {
        let intervals: Vec<String> = scenario
            .runs
            .iter()
            .map(|r| r.config.compaction_interval.to_string())
            .collect();
        let _ = writeln!(
            out,
            "{number:>3}. {} ({} turns, interval {})",
            scenario.name,
            scenario.messages.len(),
            intervals.join(" vs ")
        );
    }
}

/// Run scenarios in order, stopping at the first failure or on cancellation.
pub async fn run_scenarios<W: Write + Send>(
    harness: &ConversationHarness,
    selected: &[(usize, &Scenario)],
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<(), HarnessError> {
    for (number, scenario) in selected {
        let outcome = scenario::run_scenario(harness, *number, scenario, cancel, out).await?;
        if outcome.cancelled {
            return Ok(());
        }
    }
    if selected.len() > 1 {
        report::print_banner(out, "ALL SCENARIOS COMPLETED");
    }
    Ok(())
}

/// One line of user input.
pub(crate) enum Input {
    Line(String),
    Eof,
    Cancelled,
}

/// Print `prompt` and wait for a line, end of input or cancellation.
pub(crate) async fn read_line<R, W>(
    input: &mut Lines<R>,
    prompt: &str,
    cancel: &CancellationToken,
    out: &mut W,
) -> Input
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let _ = write!(out, "{prompt}");
    let _ = out.flush();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Input::Cancelled,
        line = input.next_line() => match line {
            Ok(Some(line)) => Input::Line(line),
            Ok(None) => Input::Eof,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read input");
                Input::Eof
            }
        },
    }
}
