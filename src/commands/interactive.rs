//! Interactive chat: one session, one turn per input line.

use std::io::Write;

use tokio::io::{AsyncBufRead, Lines};
use tokio_util::sync::CancellationToken;

use super::report::{print_banner, print_token_table, print_turn_tokens, preview, REPLY_PREVIEW_CHARS};
use super::{read_line, Input};
use crate::harness::{ConversationConfig, ConversationHarness, ConversationResult, HarnessError};

const QUIT_WORDS: &[&str] = &["quit", "exit"];

/// Chat until `quit`/`exit`, end of input or cancellation.
///
/// A failed turn is reported and skipped; the session stays open.
pub async fn run_interactive<R, W>(
    harness: &ConversationHarness,
    config: &ConversationConfig,
    input: &mut Lines<R>,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<ConversationResult, HarnessError>
where
    R: AsyncBufRead + Unpin,
    W: Write + Send,
{
    print_banner(out, "INTERACTIVE MODE");
    let _ = writeln!(out, "Share facts, chat for a while, then ask what the agent remembers.");
    let _ = writeln!(out, "Type 'quit' or 'exit' to end the session.");

    let mut run = harness.open_run(config).await?;
    let _ = writeln!(out, "Session {} ({config})", run.session().id);
    if !harness.supports_compaction() {
        let _ = writeln!(
            out,
            "Note: this backend keeps full history; compaction settings are not applied."
        );
    }

    loop {
        let prompt = format!("\n[Turn {}] You: ", run.turns().len() + 1);
        let line = match read_line(input, &prompt, cancel, out).await {
            Input::Line(line) => line,
            Input::Eof | Input::Cancelled => {
                let _ = writeln!(out, "\nExiting interactive mode.");
                break;
            }
        };

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if QUIT_WORDS.iter().any(|w| message.eq_ignore_ascii_case(w)) {
            let _ = writeln!(out, "Exiting interactive mode.");
            break;
        }

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            sent = run.send(message) => Some(sent.map(Clone::clone)),
        };
        match sent {
            None => {
                let _ = writeln!(out, "\nInterrupted.");
                break;
            }
            Some(Ok(turn)) => {
                let _ = writeln!(
                    out,
                    "Agent: {}",
                    preview(&turn.assistant_response, REPLY_PREVIEW_CHARS)
                );
                print_turn_tokens(out, &turn);
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "interactive turn failed");
                let _ = writeln!(out, "Error: {e}");
            }
        }
    }

    let result = run.finish();
    if !result.turns().is_empty() {
        print_token_table(out, &result);
    }
    Ok(result)
}
