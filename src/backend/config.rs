//! Harness configuration loading and validation.
//!
//! Reads `harness.yaml` and resolves environment variables. When no file
//! exists the same settings are taken straight from the environment, so a
//! bare `GEMINI_API_KEY=... compaction-harness` works.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::ConfigError;
use super::types::{CompactionSettings, SummarizerChoice};

/// File name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "harness.yaml";

/// Env var that points at a config file explicitly.
pub const CONFIG_PATH_ENV: &str = "COMPACTION_HARNESS_CONFIG";

const DEFAULT_AGENT_SERVER_URL: &str = "http://localhost:8000";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_APP_NAME: &str = "context_compaction_agent";
const DEFAULT_USER_ID: &str = "test_user";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Which backend adapter drives the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Agent framework API server; compaction is applied server-side.
    #[default]
    AgentServer,
    /// Direct Gemini chat; no compaction (baseline).
    Gemini,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::AgentServer => write!(f, "agent_server"),
            BackendKind::Gemini => write!(f, "gemini"),
        }
    }
}

/// Agent server endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentServerConfig {
    #[serde(default = "default_agent_server_url")]
    pub base_url: String,
}

/// Gemini REST API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// Empty after interpolation of an unset `${GEMINI_API_KEY}`; see
    /// [`HarnessConfig::require_gemini_api_key`].
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

/// Compaction parameters used by interactive mode and ad-hoc runs.
#[derive(Debug, Clone, Deserialize)]
pub struct CompactionDefaults {
    #[serde(default = "default_compaction_interval")]
    pub compaction_interval: u32,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: u32,
    #[serde(default)]
    pub summarizer: Option<SummarizerChoice>,
}

/// Top-level harness configuration (mirrors `harness.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub agent_server: AgentServerConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub defaults: CompactionDefaults,
}

fn default_agent_server_url() -> String {
    DEFAULT_AGENT_SERVER_URL.to_string()
}
fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}
fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}
fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}
fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}
fn default_compaction_interval() -> u32 {
    3
}
fn default_overlap_size() -> u32 {
    1
}

impl Default for AgentServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_agent_server_url(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
        }
    }
}

impl Default for CompactionDefaults {
    fn default() -> Self {
        Self {
            compaction_interval: default_compaction_interval(),
            overlap_size: default_overlap_size(),
            summarizer: None,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            app_name: default_app_name(),
            user_id: default_user_id(),
            agent_server: AgentServerConfig::default(),
            gemini: GeminiConfig::default(),
            defaults: CompactionDefaults::default(),
        }
    }
}

impl CompactionDefaults {
    /// The defaults as sink-ready settings.
    pub fn to_settings(&self) -> CompactionSettings {
        CompactionSettings {
            compaction_interval: self.compaction_interval,
            overlap_size: self.overlap_size,
            summarizer: self.summarizer.clone(),
        }
    }
}

impl HarnessConfig {
    /// Build a config from environment lookups only (no file).
    ///
    /// Reads `GEMINI_API_KEY`, `GEMINI_MODEL` and `ADK_SERVER_URL`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup("ADK_SERVER_URL") {
            config.agent_server.base_url = url;
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            config.gemini.model = model;
        }
        config.gemini.api_key = lookup("GEMINI_API_KEY");
        config
    }

    /// The Gemini API key, or a `MissingValue` error with setup instructions.
    pub fn require_gemini_api_key(&self) -> Result<&str, ConfigError> {
        match self.gemini.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::MissingValue {
                key: "GEMINI_API_KEY".into(),
                hint: "get a key from https://aistudio.google.com/apikey, then \
                       export GEMINI_API_KEY='your-api-key'"
                    .into(),
            }),
        }
    }

    /// Check that everything the selected backend needs is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            BackendKind::AgentServer => {
                if self.agent_server.base_url.trim().is_empty() {
                    return Err(ConfigError::MissingValue {
                        key: "ADK_SERVER_URL".into(),
                        hint: "set agent_server.base_url in harness.yaml or export ADK_SERVER_URL".into(),
                    });
                }
                Ok(())
            }
            BackendKind::Gemini => self.require_gemini_api_key().map(|_| ()),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate `harness.yaml`.
///
/// Checks `COMPACTION_HARNESS_CONFIG` first, then searches upward from `start`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    // 1. Check env var
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Ok(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_PATH_ENV} points at a missing file");
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ConfigError::NotFound {
        reason: format!("could not find {CONFIG_FILE_NAME}"),
    })
}

/// Load and parse a config file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing.
pub fn load_config(path: &Path) -> Result<HarnessConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
        reason: format!("{}: {e}", path.display()),
    })
}

/// Resolve the effective configuration.
///
/// An explicit path must load; otherwise a discovered file is used, and
/// failing that the environment alone.
pub fn resolve_config(explicit: Option<&Path>) -> Result<HarnessConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match find_config_path(&cwd) {
        Ok(path) => {
            tracing::info!(path = %path.display(), "loading harness config");
            load_config(&path)
        }
        Err(ConfigError::NotFound { .. }) => {
            tracing::info!("no {CONFIG_FILE_NAME} found, using environment");
            Ok(HarnessConfig::from_lookup(|key| std::env::var(key).ok()))
        }
        Err(e) => Err(e),
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        match std::env::var(var_name) {
            Ok(value) if !value.is_empty() => value,
            _ => expand_tilde(default),
        }
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
