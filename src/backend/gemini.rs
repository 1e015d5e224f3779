//! Google Gemini direct-chat adapter.
//!
//! Multi-turn chat against the Gemini REST API
//! (`generativelanguage.googleapis.com`). The API is stateless, so sessions
//! live here: each handle maps to the user/model history that is resent on
//! every turn. Nothing summarises that history, which makes this adapter the
//! no-compaction baseline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client as HttpClient;
use uuid::Uuid;

use super::config::GeminiConfig;
use super::errors::BackendError;
use super::streaming::parse_sse_stream;
use super::types::{
    CompactionSettings, Content, GenerateContentRequest, GenerateContentResponse, ReplyPart,
    SessionHandle, UsageReport,
};
use super::{ConversationBackend, ReplyStream};

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout for a streamed turn.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Chat history per session id.
type SessionMap = Arc<Mutex<HashMap<String, Vec<Content>>>>;

/// Google Gemini chat backend.
pub struct GeminiBackend {
    http: HttpClient,
    base_url: String,
    model: String,
    api_key: String,
    sessions: SessionMap,
}

impl GeminiBackend {
    /// Create a backend for `config.model` authenticated with `api_key`.
    pub fn new(config: &GeminiConfig, api_key: &str) -> Result<Self, BackendError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(STREAM_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.to_string(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// The model every turn is sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of turns (user + model pairs) committed to a session's history.
    pub fn history_len(&self, session: &SessionHandle) -> Option<usize> {
        let sessions = self.sessions.lock().ok()?;
        sessions.get(&session.id).map(|h| h.len() / 2)
    }

    fn history_snapshot(&self, session: &SessionHandle) -> Result<Vec<Content>, BackendError> {
        let sessions = self.sessions.lock().map_err(|e| BackendError::SessionError {
            session_id: session.id.clone(),
            reason: format!("session map lock poisoned: {e}"),
        })?;
        sessions
            .get(&session.id)
            .cloned()
            .ok_or_else(|| BackendError::SessionError {
                session_id: session.id.clone(),
                reason: "unknown or closed session".into(),
            })
    }
}

#[async_trait]
impl ConversationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn supports_compaction(&self) -> bool {
        false
    }

    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        compaction: &CompactionSettings,
    ) -> Result<SessionHandle, BackendError> {
        let id = Uuid::new_v4().to_string();

        self.sessions
            .lock()
            .map_err(|e| BackendError::SessionError {
                session_id: id.clone(),
                reason: format!("session map lock poisoned: {e}"),
            })?
            .insert(id.clone(), Vec::new());

        tracing::info!(
            session_id = %id,
            model = %self.model,
            compaction_interval = compaction.compaction_interval,
            "direct chat session opened; compaction settings are not applied by this backend"
        );

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
        let user_content = Content::text("user", message);
        let mut contents = self.history_snapshot(session)?;
        contents.push(user_content.clone());

        let url = format!("{}/models/{}:streamGenerateContent", self.base_url, self.model);

        tracing::info!(
            url = %url,
            session_id = %session.id,
            history_len = contents.len(),
            "=== GEMINI REQUEST ==="
        );

        let response = self
            .http
            .post(&url)
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest { contents })
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

        let parts = parse_sse_stream(response.bytes_stream(), decode_gemini_chunk);
        let pending = PendingExchange {
            sessions: Arc::clone(&self.sessions),
            session_id: session.id.clone(),
            user: user_content,
            reply: String::new(),
        };

        Ok(commit_on_completion(parts, pending).boxed())
    }

    fn close_session(&self, session: &SessionHandle) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(&session.id);
        }
    }
}

// ─── History commit ──────────────────────────────────────────────────────────

/// A turn whose reply is still streaming.
struct PendingExchange {
    sessions: SessionMap,
    session_id: String,
    user: Content,
    reply: String,
}

impl PendingExchange {
    /// Append the user message and the full reply to the session history.
    ///
    /// A reply without text (safety block, bare `finishReason`) is not kept:
    /// the API rejects empty parts, so the whole exchange is dropped.
    fn commit(self) {
        if self.reply.is_empty() {
            tracing::warn!(
                session_id = %self.session_id,
                "reply carried no text; exchange left out of history"
            );
            return;
        }
        match self.sessions.lock() {
            Ok(mut sessions) => {
                if let Some(history) = sessions.get_mut(&self.session_id) {
                    history.push(self.user);
                    history.push(Content::text("model", &self.reply));
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "history not committed");
            }
        }
    }
}

/// Pass reply parts through, committing the exchange once the stream ends
/// cleanly. A failed stream, or one dropped before the end, commits nothing.
fn commit_on_completion<S>(
    parts: S,
    pending: PendingExchange,
) -> impl Stream<Item = Result<ReplyPart, BackendError>>
where
    S: Stream<Item = Result<ReplyPart, BackendError>>,
{
    stream::unfold(
        (Box::pin(parts), Some(pending)),
        |(mut parts, mut pending)| async move {
            match parts.next().await {
                Some(Ok(part)) => {
                    if let (Some(p), Some(text)) = (pending.as_mut(), part.text.as_deref()) {
                        p.reply.push_str(text);
                    }
                    Some((Ok(part), (parts, pending)))
                }
                Some(Err(e)) => Some((Err(e), (parts, None))),
                None => {
                    if let Some(p) = pending.take() {
                        p.commit();
                    }
                    None
                }
            }
        },
    )
}

// ─── Chunk decoding ──────────────────────────────────────────────────────────

/// Decode one streamed `GenerateContentResponse`.
fn decode_gemini_chunk(data: &str) -> Result<Option<ReplyPart>, BackendError> {
    let chunk: GenerateContentResponse =
        serde_json::from_str(data).map_err(|e| BackendError::StreamError {
            reason: format!("failed to parse Gemini chunk: {e} (data: {data})"),
        })?;

    if let Some(error) = chunk.error {
        return Err(BackendError::StreamError {
            reason: format!("Gemini stream error: {error}"),
        });
    }

    let text = chunk
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .and_then(Content::joined_text);
    let usage = chunk.usage_metadata.as_ref().map(UsageReport::from);

    if text.is_none() && usage.is_none() {
        return Ok(None);
    }

    Ok(Some(ReplyPart { text, usage }))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> CompactionSettings {
        CompactionSettings {
            compaction_interval: 3,
            overlap_size: 1,
            summarizer: None,
        }
    }

    fn backend_for(server: &MockServer) -> GeminiBackend {
        GeminiBackend::new(
            &GeminiConfig {
                api_key: None,
                model: "gemini-2.5-flash".into(),
                base_url: server.uri(),
            },
            "test-key",
        )
        .unwrap()
    }

    async fn drain(stream: ReplyStream) -> Vec<Result<ReplyPart, BackendError>> {
        stream.collect().await
    }

    #[test]
    fn test_decode_chunk_with_text_and_usage() {
        let part = decode_gemini_chunk(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"blue"}]}}],
                "usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":1,"totalTokenCount":13}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(part.text.as_deref(), Some("blue"));
        assert_eq!(part.usage.unwrap().response_tokens, Some(1));
    }

    #[test]
    fn test_decode_chunk_error_object() {
        let err = decode_gemini_chunk(r#"{"error":{"code":503,"message":"overloaded"}}"#).unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn test_decode_empty_chunk_skipped() {
        assert!(decode_gemini_chunk(r#"{"candidates":[]}"#).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_committed_after_clean_reply() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Nice to \"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"meet you.\"}]}}],",
            "\"usageMetadata\":{\"promptTokenCount\":9,\"candidatesTokenCount\":4,\"totalTokenCount\":13}}\r\n\r\n",
        );
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let handle = backend.create_session("app", "user", &settings()).await.unwrap();
        assert_eq!(backend.history_len(&handle), Some(0));

        let parts = drain(backend.send_message(&handle, "Hi!").await.unwrap()).await;
        let text: String = parts
            .iter()
            .filter_map(|p| p.as_ref().ok().and_then(|p| p.text.clone()))
            .collect();
        assert_eq!(text, "Nice to meet you.");
        assert_eq!(backend.history_len(&handle), Some(1));
    }

    #[tokio::test]
    async fn test_history_resent_on_next_turn() {
        let server = MockServer::start().await;
        let sse = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]}}]}\n\n";
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "first"}]},
                    {"role": "model", "parts": [{"text": "ok"}]},
                    {"role": "user", "parts": [{"text": "second"}]}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let handle = backend.create_session("app", "user", &settings()).await.unwrap();
        drain(backend.send_message(&handle, "first").await.unwrap()).await;
        drain(backend.send_message(&handle, "second").await.unwrap()).await;
        assert_eq!(backend.history_len(&handle), Some(2));
    }

    #[tokio::test]
    async fn test_failed_reply_leaves_history_unchanged() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"partial\"}]}}]}\n\n",
            "data: {\"error\":{\"code\":500,\"message\":\"internal\"}}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let handle = backend.create_session("app", "user", &settings()).await.unwrap();
        let parts = drain(backend.send_message(&handle, "hi").await.unwrap()).await;
        assert!(parts.last().unwrap().is_err());
        assert_eq!(backend.history_len(&handle), Some(0));
    }

    #[tokio::test]
    async fn test_abandoned_reply_leaves_history_unchanged() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"one\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"two\"}]}}]}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let handle = backend.create_session("app", "user", &settings()).await.unwrap();
        let mut stream = backend.send_message(&handle, "hi").await.unwrap();
        let _first = stream.next().await;
        drop(stream);
        assert_eq!(backend.history_len(&handle), Some(0));
    }

    #[tokio::test]
    async fn test_closed_session_is_rejected() {
        let server = MockServer::start().await;
        let backend = backend_for(&server);
        let handle = backend.create_session("app", "user", &settings()).await.unwrap();
        backend.close_session(&handle);

        match backend.send_message(&handle, "hi").await {
            Err(BackendError::SessionError { session_id, .. }) => assert_eq!(session_id, handle.id),
            Err(other) => panic!("expected SessionError, got {other:?}"),
            Ok(_) => panic!("expected SessionError"),
        }
    }

    async fn request_contents(server: &MockServer) -> Vec<serde_json::Value> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| {
                let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
                body["contents"].clone()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_blocked_reply_is_not_resent() {
        let server = MockServer::start().await;
        let blocked = concat!(
            "data: {\"candidates\":[{\"finishReason\":\"SAFETY\"}],",
            "\"usageMetadata\":{\"promptTokenCount\":7,\"totalTokenCount\":7}}\n\n",
        );
        let ok = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]}}]}\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(blocked))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ok))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let handle = backend.create_session("app", "user", &settings()).await.unwrap();

        let parts = drain(backend.send_message(&handle, "first").await.unwrap()).await;
        assert!(parts.iter().all(|p| p.is_ok()));
        assert_eq!(backend.history_len(&handle), Some(0));

        drain(backend.send_message(&handle, "second").await.unwrap()).await;
        let bodies = request_contents(&server).await;
        assert_eq!(
            bodies[1],
            serde_json::json!([{"role": "user", "parts": [{"text": "second"}]}])
        );
        assert_eq!(backend.history_len(&handle), Some(1));
    }

    #[tokio::test]
    async fn test_interleaved_sessions_keep_separate_histories() {
        let server = MockServer::start().await;
        let sse = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]}}]}\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let a = backend.create_session("app", "user", &settings()).await.unwrap();
        let b = backend.create_session("app", "user", &settings()).await.unwrap();

        // Both replies in flight before either is drained.
        let stream_a = backend.send_message(&a, "a1").await.unwrap();
        let stream_b = backend.send_message(&b, "b1").await.unwrap();
        drain(stream_b).await;
        drain(stream_a).await;

        let (a2, b2) = tokio::join!(
            async { drain(backend.send_message(&a, "a2").await.unwrap()).await },
            async { drain(backend.send_message(&b, "b2").await.unwrap()).await },
        );
        assert!(a2.iter().chain(b2.iter()).all(|p| p.is_ok()));

        let expected = |first: &str, second: &str| {
            serde_json::json!([
                {"role": "user", "parts": [{"text": first}]},
                {"role": "model", "parts": [{"text": "ok"}]},
                {"role": "user", "parts": [{"text": second}]}
            ])
        };
        let bodies = request_contents(&server).await;
        assert_eq!(bodies.len(), 4);
        assert!(bodies.contains(&expected("a1", "a2")));
        assert!(bodies.contains(&expected("b1", "b2")));
        assert_eq!(backend.history_len(&a), Some(2));
        assert_eq!(backend.history_len(&b), Some(2));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let server = MockServer::start().await;
        let backend = backend_for(&server);
        let a = backend.create_session("app", "user", &settings()).await.unwrap();
        let b = backend.create_session("app", "user", &settings()).await.unwrap();
        assert_ne!(a.id, b.id);
        backend.close_session(&a);
        assert_eq!(backend.history_len(&a), None);
        assert_eq!(backend.history_len(&b), Some(0));
    }
}
