//! SSE streaming response parser shared by the backend adapters.
//!
//! Reads a byte stream (normally `reqwest::Response::bytes_stream`), splits
//! it on SSE event boundaries (`\n\n` or `\r\n\r\n`), joins the `data:` lines
//! of each event and hands the payload to an adapter-specific decoder that
//! turns it into a `ReplyPart`.

use futures::stream::{self, Stream, StreamExt};

use super::errors::BackendError;
use super::types::ReplyPart;

// ─── SSE event parser ────────────────────────────────────────────────────────

/// Parse raw SSE bytes into `ReplyPart`s using `decode` for each payload.
///
/// The decoder returns `Ok(None)` for payloads that carry nothing for the
/// harness (e.g. a bare state-delta event). The stream ends after the first
/// error it yields.
pub fn parse_sse_stream<S, B, E, D>(
    byte_stream: S,
    decode: D,
) -> impl Stream<Item = Result<ReplyPart, BackendError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    D: FnMut(&str) -> Result<Option<ReplyPart>, BackendError>,
{
    let state = SseState {
        byte_stream: Box::pin(byte_stream),
        buffer: Vec::new(),
        decode,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            // Drain complete events already in the buffer
            if let Some((end, sep_len)) = find_event_boundary(&state.buffer) {
                let event: Vec<u8> = state.buffer.drain(..end + sep_len).take(end).collect();
                let event = String::from_utf8_lossy(&event);

                match process_event(&event, &mut state.decode) {
                    Ok(Some(part)) => return Some((Ok(part), state)),
                    Ok(None) => continue, // keep-alive, [DONE], or nothing to report
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }

            match state.byte_stream.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((
                        Err(BackendError::StreamError {
                            reason: format!("stream read error: {e}"),
                        }),
                        state,
                    ));
                }
                None => {
                    // Stream ended: flush an unterminated trailing event
                    state.finished = true;
                    let rest = std::mem::take(&mut state.buffer);
                    let rest = String::from_utf8_lossy(&rest);
                    if rest.trim().is_empty() {
                        return None;
                    }
                    return match process_event(rest.trim(), &mut state.decode) {
                        Ok(Some(part)) => Some((Ok(part), state)),
                        Ok(None) => None,
                        Err(e) => Some((Err(e), state)),
                    };
                }
            }
        }
    })
}

/// Parser state threaded through `stream::unfold`.
struct SseState<S, D> {
    byte_stream: std::pin::Pin<Box<S>>,
    /// Bytes received but not yet split into events. Kept as bytes so a
    /// multi-byte character split across network chunks is decoded intact.
    buffer: Vec<u8>,
    decode: D,
    finished: bool,
}

/// Find the earliest event terminator: returns `(event_end, separator_len)`.
fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = find_subslice(buf, b"\n\n").map(|i| (i, 2));
    let crlf = find_subslice(buf, b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Process a single SSE event string (may contain multiple `data:` lines).
fn process_event<D>(event: &str, decode: &mut D) -> Result<Option<ReplyPart>, BackendError>
where
    D: FnMut(&str) -> Result<Option<ReplyPart>, BackendError>,
{
    let mut data_lines = Vec::new();

    for line in event.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.strip_prefix(' ').unwrap_or(data));
        }
        // Ignore comments, `event:` and `id:` lines
    }

    let data = data_lines.join("\n");
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    decode(data)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
