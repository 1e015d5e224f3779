//! Shared types for the backend adapters.
//!
//! The first half is the adapter-neutral surface the harness consumes
//! (`SessionHandle`, `ReplyPart`, `UsageReport`, `CompactionSettings`). The
//! second half mirrors the JSON wire formats of the agent server and the
//! Gemini REST API, which share the `Content`/`Part` shape.

use serde::{Deserialize, Serialize};

// ─── Harness-facing Types ────────────────────────────────────────────────────

/// Opaque handle for one continuous conversation thread held by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Backend-assigned session identifier.
    pub id: String,
    /// Application the session belongs to.
    pub app_name: String,
    /// User the session belongs to.
    pub user_id: String,
}

/// Which external summarisation strategy the framework should use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarizerChoice {
    /// Let the framework pick its built-in summariser.
    FrameworkDefault,
    /// An LLM-backed event summariser running the named model.
    Llm { model: String },
}

impl std::fmt::Display for SummarizerChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummarizerChoice::FrameworkDefault => write!(f, "framework default"),
            SummarizerChoice::Llm { model } => write!(f, "llm ({model})"),
        }
    }
}

/// Compaction parameters handed to the backend's configuration sink.
///
/// Applied opaquely by the external framework. The harness never observes a
/// compaction directly, only its effect on reported prompt tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionSettings {
    pub compaction_interval: u32,
    pub overlap_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarizer: Option<SummarizerChoice>,
}

/// Token counters attached to a reply part, when the backend reports them.
///
/// Every field is independently optional: backends report any subset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageReport {
    pub prompt_tokens: Option<u64>,
    pub response_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl UsageReport {
    /// Whether no counter at all is present.
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none() && self.response_tokens.is_none() && self.total_tokens.is_none()
    }
}

impl From<&UsageMetadata> for UsageReport {
    fn from(meta: &UsageMetadata) -> Self {
        Self {
            prompt_tokens: meta.prompt_token_count,
            response_tokens: meta.candidates_token_count,
            total_tokens: meta.total_token_count,
        }
    }
}

/// One piece of a (possibly multi-part) streamed reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyPart {
    /// Text carried by this part, in arrival order.
    pub text: Option<String>,
    /// Usage counters carried by this part.
    pub usage: Option<UsageReport>,
}

// ─── Wire Types: shared ──────────────────────────────────────────────────────

/// A role-tagged list of parts (user message or model reply).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Parts can be missing on empty or blocked responses.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Build a single-text content with the given role.
    pub fn text(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }

    /// Concatenate the text of all parts, or `None` if there is none.
    pub fn joined_text(&self) -> Option<String> {
        let text: String = self
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// A single content part. Non-text parts (function calls etc.) deserialize
/// with `text: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Usage metadata as reported on the wire.
///
/// The response counter is `candidatesTokenCount` in the model API and
/// `responseTokenCount` in some framework event dumps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u64>,
    #[serde(default, alias = "responseTokenCount")]
    pub candidates_token_count: Option<u64>,
    #[serde(default)]
    pub total_token_count: Option<u64>,
}

// ─── Wire Types: agent server ────────────────────────────────────────────────

/// Request body for `POST /apps/{app}/users/{user}/sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub state: SessionState,
}

/// Initial session state.
///
/// The server applies `compaction` only if its app reads this entry when
/// building the compaction config. An app with a fixed config ignores it, and
/// runs that differ only in interval or overlap then behave identically.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub compaction: CompactionSettings,
}

/// Response body for session creation (only the fields the harness needs).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub id: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Request body for `POST /run_sse`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub new_message: Content,
    pub streaming: bool,
}

/// One event from the agent server's SSE stream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    /// `true` for streaming previews that a later complete event repeats.
    #[serde(default)]
    pub partial: Option<bool>,
    #[serde(default)]
    pub error_code: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Set instead of everything else when the server failed mid-run.
    #[serde(default)]
    pub error: Option<String>,
}

// ─── Wire Types: Gemini ──────────────────────────────────────────────────────

/// Request body for `models/{model}:streamGenerateContent`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

/// One streamed `GenerateContentResponse` chunk.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    /// Present when the API aborts the stream with an error object.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// A single candidate within a response chunk.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
