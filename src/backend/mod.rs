//! Backend adapters: the narrow interface to the external conversational services.
//!
//! This module owns everything that talks to the outside world:
//! - Session creation (the session provider)
//! - Handing compaction settings to the framework (the configuration sink)
//! - Submitting user turns and streaming back reply parts with usage counters
//! - SSE stream parsing shared by both adapters
//! - Configuration loading from `harness.yaml` / the environment
//!
//! Two adapters implement [`ConversationBackend`]: [`AgentServerBackend`]
//! (an agent framework API server that applies compaction) and
//! [`GeminiBackend`] (direct chat against the model API, no compaction).

pub mod agent_server;
pub mod config;
pub mod errors;
pub mod gemini;
pub mod streaming;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

// Re-exports for convenience
pub use agent_server::AgentServerBackend;
pub use config::{BackendKind, HarnessConfig};
pub use errors::{BackendError, ConfigError};
pub use gemini::GeminiBackend;
pub use types::{CompactionSettings, ReplyPart, SessionHandle, SummarizerChoice, UsageReport};

/// Stream of reply parts for one submitted turn, in arrival order.
pub type ReplyStream = BoxStream<'static, Result<ReplyPart, BackendError>>;

/// A conversational backend together with its session provider and
/// compaction configuration sink.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Short adapter name for logs and reports.
    fn name(&self) -> &str;

    /// Whether compaction settings passed to [`create_session`] take effect.
    ///
    /// [`create_session`]: ConversationBackend::create_session
    fn supports_compaction(&self) -> bool;

    /// Open a new conversation thread, applying `compaction` opaquely.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        compaction: &CompactionSettings,
    ) -> Result<SessionHandle, BackendError>;

    /// Submit `message` as the next user turn of `session`.
    async fn send_message(
        &self,
        session: &SessionHandle,
        message: &str,
    ) -> Result<ReplyStream, BackendError>;

    /// Release any local state held for `session`. Remote state is left alone.
    fn close_session(&self, _session: &SessionHandle) {}
}

/// Construct the adapter selected by `config.backend`.
///
/// Call [`HarnessConfig::validate`] first to report missing configuration
/// with setup hints; this only fails on client construction errors.
pub fn connect(config: &HarnessConfig) -> Result<Arc<dyn ConversationBackend>, BackendError> {
    match config.backend {
        BackendKind::AgentServer => Ok(Arc::new(AgentServerBackend::new(&config.agent_server)?)),
        BackendKind::Gemini => {
            let api_key = config
                .require_gemini_api_key()
                .map_err(|e| BackendError::ConfigError {
                    reason: e.to_string(),
                })?;
            Ok(Arc::new(GeminiBackend::new(&config.gemini, api_key)?))
        }
    }
}
