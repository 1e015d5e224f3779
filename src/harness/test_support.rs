//! In-process scripted backend for harness tests.
//!
//! Simulates an agent framework that keeps per-session history and, when
//! compaction is supported, folds older turns into a fixed-size summary every
//! `compaction_interval` completed turns, keeping the last `overlap_size`
//! turns verbatim. Prompt tokens grow with the context held for the session,
//! so compaction shows up only as smaller prompt counts, as it does against
//! a real server. Token counts are whitespace-separated words.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::backend::{
    BackendError, CompactionSettings, ConversationBackend, ReplyPart, ReplyStream, SessionHandle,
    UsageReport,
};

/// Tokens charged for the system instruction on every request.
pub const SYSTEM_TOKENS: u64 = 40;
/// Size of the summary that replaces compacted turns.
pub const SUMMARY_TOKENS: u64 = 12;

/// Which usage counters the scripted backend reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageMode {
    /// prompt, response and total on the final part.
    Full,
    /// prompt and total only; the harness must derive the response count.
    PromptAndTotal,
    /// total smaller than prompt, with no response count.
    Inconsistent,
    /// no usage at all.
    Silent,
}

type ReplyFn = Box<dyn Fn(&[(String, String)], &str) -> String + Send + Sync>;

#[derive(Default)]
struct SimSession {
    settings: Option<CompactionSettings>,
    history: Vec<(String, String)>,
    /// Token sizes of the items currently in context.
    context: Vec<u64>,
    turns_since_compaction: u32,
}

pub struct ScriptedBackend {
    compaction: bool,
    usage: UsageMode,
    fail_session: bool,
    fail_on_turn: Option<usize>,
    fail_mid_stream_on: Option<usize>,
    hang_on_turn: Option<usize>,
    reply: ReplyFn,
    sessions: Mutex<HashMap<String, SimSession>>,
    pub sessions_created: AtomicUsize,
    pub messages_sent: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub compactions: AtomicUsize,
}

fn words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            compaction: true,
            usage: UsageMode::Full,
            fail_session: false,
            fail_on_turn: None,
            fail_mid_stream_on: None,
            hang_on_turn: None,
            reply: Box::new(|_, message| format!("You said: {message}")),
            sessions: Mutex::new(HashMap::new()),
            sessions_created: AtomicUsize::new(0),
            messages_sent: AtomicUsize::new(0),
            sessions_closed: AtomicUsize::new(0),
            compactions: AtomicUsize::new(0),
        }
    }

    /// Ignore compaction settings (full history on every request).
    pub fn without_compaction(mut self) -> Self {
        self.compaction = false;
        self
    }

    pub fn with_usage(mut self, usage: UsageMode) -> Self {
        self.usage = usage;
        self
    }

    pub fn failing_session(mut self) -> Self {
        self.fail_session = true;
        self
    }

    /// Refuse the request for the given 1-based turn.
    pub fn failing_on_turn(mut self, turn: usize) -> Self {
        self.fail_on_turn = Some(turn);
        self
    }

    /// Emit one text part then a stream error on the given turn.
    pub fn failing_mid_stream_on(mut self, turn: usize) -> Self {
        self.fail_mid_stream_on = Some(turn);
        self
    }

    /// Never finish the reply for the given turn.
    pub fn hanging_on_turn(mut self, turn: usize) -> Self {
        self.hang_on_turn = Some(turn);
        self
    }

    pub fn with_reply<F>(mut self, reply: F) -> Self
    where
        F: Fn(&[(String, String)], &str) -> String + Send + Sync + 'static,
    {
        self.reply = Box::new(reply);
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn usage_for(&self, prompt: u64, response: u64) -> Option<UsageReport> {
        let total = prompt + response;
        match self.usage {
            UsageMode::Full => Some(UsageReport {
                prompt_tokens: Some(prompt),
                response_tokens: Some(response),
                total_tokens: Some(total),
            }),
            UsageMode::PromptAndTotal => Some(UsageReport {
                prompt_tokens: Some(prompt),
                response_tokens: None,
                total_tokens: Some(total),
            }),
            UsageMode::Inconsistent => Some(UsageReport {
                prompt_tokens: Some(prompt),
                response_tokens: None,
                total_tokens: Some(prompt.saturating_sub(1)),
            }),
            UsageMode::Silent => None,
        }
    }
}

#[async_trait]
impl ConversationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supports_compaction(&self) -> bool {
        self.compaction
    }

    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        compaction: &CompactionSettings,
    ) -> Result<SessionHandle, BackendError> {
        if self.fail_session {
            return Err(BackendError::ConnectionFailed {
                endpoint: "scripted".into(),
                reason: "session service down".into(),
            });
        }
        let n = self.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("scripted-{n}");
        let session = SimSession {
            settings: self.compaction.then(|| compaction.clone()),
            ..SimSession::default()
        };
        self.sessions
            .lock()
            .map_err(|_| BackendError::SessionError {
                session_id: id.clone(),
                reason: "state poisoned".into(),
            })?
            .insert(id.clone(), session);
        Ok(SessionHandle {
            id,
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
        })
    }

    async fn send_message(
        &self,
        session: &SessionHandle,
        message: &str,
    ) -> Result<ReplyStream, BackendError> {
        let mut sessions = self.sessions.lock().map_err(|_| BackendError::SessionError {
            session_id: session.id.clone(),
            reason: "state poisoned".into(),
        })?;
        let sim = sessions
            .get_mut(&session.id)
            .ok_or_else(|| BackendError::SessionError {
                session_id: session.id.clone(),
                reason: "unknown session".into(),
            })?;

        let turn = sim.history.len() + 1;
        self.messages_sent.fetch_add(1, Ordering::SeqCst);

        if self.fail_on_turn == Some(turn) {
            return Err(BackendError::HttpError {
                status: 500,
                body: "internal error".into(),
            });
        }
        if self.hang_on_turn == Some(turn) {
            return Ok(stream::pending().boxed());
        }

        let prompt = SYSTEM_TOKENS + sim.context.iter().sum::<u64>() + words(message);
        let reply = (self.reply)(&sim.history, message);

        if self.fail_mid_stream_on == Some(turn) {
            let first = ReplyPart {
                text: Some(reply),
                usage: None,
            };
            return Ok(stream::iter(vec![
                Ok(first),
                Err(BackendError::StreamError {
                    reason: "connection reset".into(),
                }),
            ])
            .boxed());
        }

        let response = words(&reply);
        sim.history.push((message.to_string(), reply.clone()));
        sim.context.push(words(message) + response);
        sim.turns_since_compaction += 1;

        if let Some(settings) = &sim.settings {
            if sim.turns_since_compaction >= settings.compaction_interval {
                let keep = (settings.overlap_size as usize).min(sim.context.len());
                let recent = sim.context.split_off(sim.context.len() - keep);
                sim.context = vec![SUMMARY_TOKENS];
                sim.context.extend(recent);
                sim.turns_since_compaction = 0;
                self.compactions.fetch_add(1, Ordering::SeqCst);
            }
        }

        // Split the reply across two text parts; usage rides on the last one.
        let mid = reply
            .char_indices()
            .nth(reply.chars().count() / 2)
            .map(|(i, _)| i)
            .unwrap_or(reply.len());
        let (head, tail) = reply.split_at(mid);
        let parts = vec![
            Ok(ReplyPart {
                text: Some(head.to_string()),
                usage: None,
            }),
            Ok(ReplyPart {
                text: Some(tail.to_string()),
                usage: self.usage_for(prompt, response),
            }),
        ];
        Ok(stream::iter(parts).boxed())
    }

    fn close_session(&self, session: &SessionHandle) {
        if let Ok(mut sessions) = self.sessions.lock() {
            if sessions.remove(&session.id).is_some() {
                self.sessions_closed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}
