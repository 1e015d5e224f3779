//! Conversation runner.
//!
//! Drives one session against a [`ConversationBackend`]: opens the session
//! with the run's compaction settings, submits messages strictly in order
//! (turn k+1 is never sent before turn k's reply has been drained), and
//! records one [`Turn`] per completed exchange.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::errors::HarnessError;
use super::types::{ConversationConfig, ConversationResult, SessionIdentity, Turn};
use super::usage::UsageAccumulator;
use crate::backend::{ConversationBackend, SessionHandle};

/// Progress callbacks for a run. All methods default to no-ops.
pub trait RunObserver: Send {
    fn on_session_opened(&mut self, _session: &SessionHandle, _config: &ConversationConfig) {}

    fn on_turn_started(&mut self, _index: usize, _message: &str) {}

    fn on_turn_completed(&mut self, _turn: &Turn) {}
}

/// Observer that ignores every event.
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

// ─── Harness ─────────────────────────────────────────────────────────────────

/// Runs scripted or interactive conversations against one backend.
#[derive(Clone)]
pub struct ConversationHarness {
    backend: Arc<dyn ConversationBackend>,
    identity: SessionIdentity,
}

impl ConversationHarness {
    pub fn new(backend: Arc<dyn ConversationBackend>, identity: SessionIdentity) -> Self {
        Self { backend, identity }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Whether the backend applies the compaction settings it is given.
    pub fn supports_compaction(&self) -> bool {
        self.backend.supports_compaction()
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Validate `config` and open a fresh session for turn-at-a-time use.
    pub async fn open_run(&self, config: &ConversationConfig) -> Result<ConversationRun, HarnessError> {
        config.validate()?;

        let session = self
            .backend
            .create_session(&self.identity.app_name, &self.identity.user_id, &config.to_settings())
            .await
            .map_err(|source| {
                tracing::error!(
                    backend = self.backend.name(),
                    error = %source,
                    "failed to open session"
                );
                HarnessError::SessionOpen {
                    backend: self.backend.name().to_string(),
                    source,
                }
            })?;

        tracing::info!(
            backend = self.backend.name(),
            session_id = %session.id,
            compaction_interval = config.compaction_interval,
            overlap_size = config.overlap_size,
            compaction_applied = self.backend.supports_compaction(),
            "session opened"
        );

        let result = ConversationResult::started(&session.id, self.backend.name(), config.clone());
        Ok(ConversationRun {
            backend: Arc::clone(&self.backend),
            session,
            result,
            released: false,
        })
    }

    /// Send every message in order within one session.
    pub async fn run_conversation<S: AsRef<str>>(
        &self,
        messages: &[S],
        config: &ConversationConfig,
    ) -> Result<ConversationResult, HarnessError> {
        self.run_conversation_cancellable(messages, config, &CancellationToken::new(), &mut SilentObserver)
            .await
    }

    /// Like [`run_conversation`](Self::run_conversation), stopping early when
    /// `cancel` fires. A cancelled run returns the turns completed so far; the
    /// in-flight turn is abandoned and not recorded.
    pub async fn run_conversation_cancellable<S: AsRef<str>>(
        &self,
        messages: &[S],
        config: &ConversationConfig,
        cancel: &CancellationToken,
        observer: &mut dyn RunObserver,
    ) -> Result<ConversationResult, HarnessError> {
        if messages.is_empty() {
            return Err(HarnessError::InvalidConfig {
                reason: "at least one message is required".into(),
            });
        }
        config.validate()?;

        let mut run = self.open_run(config).await?;
        observer.on_session_opened(run.session(), config);

        for message in messages {
            let message = message.as_ref();
            let index = run.turns().len() + 1;
            observer.on_turn_started(index, message);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                sent = run.send(message) => Some(sent.map(|_| ())),
            };

            match outcome {
                None => {
                    tracing::warn!(
                        session_id = %run.session().id,
                        completed_turns = index - 1,
                        "run cancelled"
                    );
                    return Ok(run.finish_cancelled());
                }
                Some(Err(e)) => {
                    tracing::error!(session_id = %run.session().id, error = %e, "run aborted");
                    return Err(e);
                }
                Some(Ok(())) => {
                    if let Some(turn) = run.turns().last() {
                        observer.on_turn_completed(turn);
                    }
                }
            }
        }

        Ok(run.finish())
    }
}

// ─── Run ─────────────────────────────────────────────────────────────────────

/// One open session plus the turns recorded so far.
///
/// The session is released when the run is finished or dropped.
pub struct ConversationRun {
    backend: Arc<dyn ConversationBackend>,
    session: SessionHandle,
    result: ConversationResult,
    released: bool,
}

impl ConversationRun {
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn config(&self) -> &ConversationConfig {
        self.result.config()
    }

    pub fn turns(&self) -> &[Turn] {
        self.result.turns()
    }

    pub fn total_prompt_tokens(&self) -> u64 {
        self.result.total_prompt_tokens()
    }

    /// Submit `message` as the next turn and wait for the full reply.
    ///
    /// On error nothing is recorded and the run can still be finished.
    pub async fn send(&mut self, message: &str) -> Result<&Turn, HarnessError> {
        let turn = self.result.turns().len() + 1;

        let mut stream = self
            .backend
            .send_message(&self.session, message)
            .await
            .map_err(|source| HarnessError::Backend { turn, source })?;

        let mut response = String::new();
        let mut usage = UsageAccumulator::default();
        let mut part_count = 0usize;

        while let Some(part) = stream.next().await {
            let part = part.map_err(|source| HarnessError::Backend { turn, source })?;
            part_count += 1;
            if let Some(text) = part.text {
                response.push_str(&text);
            }
            if let Some(report) = part.usage {
                usage.merge(&report);
            }
        }

        let tokens = usage.resolve().map_err(|v| HarnessError::UsageContract {
            turn,
            prompt_tokens: v.prompt_tokens,
            total_tokens: v.total_tokens,
        })?;

        if !tokens.reported {
            tracing::debug!(session_id = %self.session.id, turn, "no usage reported");
        }
        tracing::info!(
            session_id = %self.session.id,
            turn,
            parts = part_count,
            prompt_tokens = tokens.prompt,
            response_tokens = tokens.response,
            total_tokens = tokens.total,
            "turn completed"
        );

        Ok(self.result.push_turn(message.to_string(), response, tokens))
    }

    /// Release the session and return the run's result.
    pub fn finish(self) -> ConversationResult {
        self.complete(false)
    }

    fn finish_cancelled(self) -> ConversationResult {
        self.complete(true)
    }

    fn complete(mut self, cancelled: bool) -> ConversationResult {
        self.release();
        let config = self.result.config().clone();
        let result = std::mem::replace(
            &mut self.result,
            ConversationResult::started(String::new(), String::new(), config),
        );
        let result = result.finalize(cancelled);
        tracing::info!(
            session_id = %result.session_id(),
            turns = result.turns().len(),
            total_prompt_tokens = result.total_prompt_tokens(),
            total_response_tokens = result.total_response_tokens(),
            cancelled,
            "run finished"
        );
        result
    }

    fn release(&mut self) {
        if !self.released {
            self.backend.close_session(&self.session);
            self.released = true;
        }
    }
}

impl Drop for ConversationRun {
    fn drop(&mut self) {
        self.release();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
