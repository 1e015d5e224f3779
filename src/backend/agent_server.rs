//! Agent framework API server adapter.
//!
//! Creates sessions on the server (seeding the compaction settings into the
//! session state) and runs turns through `POST /run_sse`, streaming back the
//! framework's events. Compaction happens server-side; the harness only sees
//! its effect on the reported prompt tokens.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;

use super::config::AgentServerConfig;
use super::errors::BackendError;
use super::streaming::parse_sse_stream;
use super::types::{
    AgentEvent, CompactionSettings, Content, CreateSessionRequest, CreateSessionResponse,
    ReplyPart, RunAgentRequest, SessionHandle, SessionState, UsageReport,
};
use super::{ConversationBackend, ReplyStream};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout for session management calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Total request timeout for a streamed turn.
///
/// A turn that triggers compaction runs the summariser before the agent
/// replies, so the first byte can take much longer than a plain completion.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// ─── AgentServerBackend ──────────────────────────────────────────────────────

/// Client for an agent framework's HTTP API server.
pub struct AgentServerBackend {
    /// HTTP client for session management (30s timeout).
    http: HttpClient,
    /// HTTP client for streamed turns (180s timeout).
    http_stream: HttpClient,
    /// Server root, without trailing slash.
    base_url: String,
}

impl AgentServerBackend {
    /// Create a client for the server at `config.base_url`.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn new(config: &AgentServerConfig) -> Result<Self, BackendError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(BackendError::ConfigError {
                reason: "agent server base_url is empty".into(),
            });
        }

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_stream = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(STREAM_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::ConfigError {
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            http_stream,
            base_url,
        })
    }

    /// The server root this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ConversationBackend for AgentServerBackend {
    fn name(&self) -> &str {
        "agent_server"
    }

    fn supports_compaction(&self) -> bool {
        true
    }

    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        compaction: &CompactionSettings,
    ) -> Result<SessionHandle, BackendError> {
        let url = format!("{}/apps/{app_name}/users/{user_id}/sessions", self.base_url);
        let body = CreateSessionRequest {
            state: SessionState {
                compaction: compaction.clone(),
            },
        };

        tracing::info!(
            url = %url,
            compaction_interval = compaction.compaction_interval,
            overlap_size = compaction.overlap_size,
            summarizer = ?compaction.summarizer,
            "creating agent server session"
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&url, &e, REQUEST_TIMEOUT.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BackendError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let created: CreateSessionResponse =
            response.json().await.map_err(|e| BackendError::StreamError {
                reason: format!("invalid session response: {e}"),
            })?;

        Ok(SessionHandle {
            id: created.id,
            app_name: created.app_name.unwrap_or_else(|| app_name.to_string()),
            user_id: created.user_id.unwrap_or_else(|| user_id.to_string()),
        })
    }

    async fn send_message(
        &self,
        session: &SessionHandle,
        message: &str,
    ) -> Result<ReplyStream, BackendError> {
        let url = format!("{}/run_sse", self.base_url);
        let body = RunAgentRequest {
            app_name: session.app_name.clone(),
            user_id: session.user_id.clone(),
            session_id: session.id.clone(),
            new_message: Content::text("user", message),
            streaming: false,
        };

        // Log the request metadata (not the message, it can be huge)
        tracing::info!(
            url = %url,
            session_id = %session.id,
            message_len = message.len(),
            "=== AGENT RUN REQUEST ==="
        );

        let response = self
            .http_stream
            .post(&url)
            .json(&body)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&url, &e, STREAM_REQUEST_TIMEOUT.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BackendError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        Ok(parse_sse_stream(response.bytes_stream(), decode_agent_event).boxed())
    }
}

// ─── Event decoding ──────────────────────────────────────────────────────────

/// Decode one `run_sse` payload into a reply part.
///
/// - `{"error": "..."}` aborts the turn.
/// - Partial events contribute usage only; the complete event that follows
///   repeats their text.
/// - `errorCode`/`errorMessage` (e.g. a length-truncated reply) are logged;
///   whatever text came with the event is kept.
fn decode_agent_event(data: &str) -> Result<Option<ReplyPart>, BackendError> {
    let event: AgentEvent = serde_json::from_str(data).map_err(|e| BackendError::StreamError {
        reason: format!("failed to parse agent event: {e} (data: {data})"),
    })?;

    if let Some(error) = event.error {
        return Err(BackendError::StreamError {
            reason: format!("agent server error: {error}"),
        });
    }

    if event.error_code.is_some() || event.error_message.is_some() {
        tracing::warn!(
            author = ?event.author,
            error_code = ?event.error_code,
            error_message = ?event.error_message,
            "agent event reported an error"
        );
    }

    let partial = event.partial.unwrap_or(false);
    let text = if partial {
        None
    } else {
        event.content.as_ref().and_then(Content::joined_text)
    };
    let usage = event.usage_metadata.as_ref().map(UsageReport::from);

    if text.is_none() && usage.is_none() {
        return Ok(None);
    }

    Ok(Some(ReplyPart { text, usage }))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
