//! Backend error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to a conversational backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// TCP/HTTP connection to the backend endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// The backend did not respond within the configured timeout.
    #[error("backend timeout after {duration_secs}s")]
    Timeout {
        duration_secs: u64,
    },

    /// Non-2xx HTTP response from the backend.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// SSE stream parsing, chunk decoding, or an error event inside the stream.
    #[error("stream error: {reason}")]
    StreamError {
        reason: String,
    },

    /// The session handle is unknown to the backend or its state is unusable.
    #[error("session '{session_id}' unavailable: {reason}")]
    SessionError {
        session_id: String,
        reason: String,
    },

    /// Adapter construction failed (bad URL, HTTP client build failure).
    #[error("backend config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

/// Errors raised while locating, loading or validating `harness.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config file was found (callers usually fall back to the environment).
    #[error("config not found: {reason}")]
    NotFound { reason: String },

    /// The config file exists but could not be read.
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    /// The config file is not valid YAML for the expected schema.
    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    /// A required value is absent from both the file and the environment.
    #[error("missing required configuration {key}: {hint}")]
    MissingValue { key: String, hint: String },
}

impl BackendError {
    /// Map a `reqwest` transport error onto the backend taxonomy.
    pub(crate) fn from_transport(endpoint: &str, err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            BackendError::Timeout {
                duration_secs: timeout_secs,
            }
        } else {
            BackendError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether the backend rejected the request for quota reasons (HTTP 429).
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, BackendError::HttpError { status: 429, .. })
    }

    /// HTTP status, if this is an `HttpError`.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BackendError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
