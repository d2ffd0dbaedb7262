use async_trait::async_trait;
use billscan_core::{ErrorClass, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),
    #[error("LLM backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl ErrorClass for LlmError {
    fn kind(&self) -> ErrorKind {
        match self {
            LlmError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            LlmError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
        }
    }
}

/// One completion request. `json_only` asks the backend to constrain output
/// to a JSON object when it supports that.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub json_only: bool,
}

/// A hosted language model. Returns the raw completion text.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: LlmBackend + ?Sized> LlmBackend for Box<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        (**self).complete(request).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Set to false to skip the LLM stage entirely.
    pub enabled: bool,
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

// ── OpenAI-compatible chat completions ────────────────────────────────────────

pub struct OpenAiClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::BackendUnavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn from_env(config: &LlmConfig) -> Result<Self, LlmError> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::BackendUnavailable(format!("{} not set", config.api_key_env)))?;
        Self::new(config, key)
    }
}

fn chat_body(request: &LlmRequest) -> ChatRequest<'_> {
    ChatRequest {
        model: &request.model,
        messages: [
            ChatMessage { role: "system", content: &request.system },
            ChatMessage { role: "user", content: &request.prompt },
        ],
        temperature: request.temperature,
        response_format: request.json_only.then_some(ResponseFormat { kind: "json_object" }),
    }
}

#[async_trait]
impl LlmBackend for OpenAiClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&chat_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::BackendUnavailable(format!("Request timed out after {}s", self.timeout_secs))
                } else if e.is_connect() {
                    LlmError::BackendUnavailable(format!("Connection failed: {e}"))
                } else {
                    LlmError::BackendUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::BackendUnavailable(format!(
                "LLM API returned {status}: {}",
                body.trim()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(format!("Invalid completion envelope: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("Completion has no content".to_string()))
    }
}

// ── Test doubles ──────────────────────────────────────────────────────────────

/// Always answers with the same text.
pub struct MockLlm {
    response: String,
    calls: AtomicUsize,
}

impl MockLlm {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into(), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmBackend for MockLlm {
    async fn complete(&self, _request: &LlmRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Replays a fixed sequence of outcomes, repeating the last one once the
/// script runs out.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    last: Mutex<Option<Result<String, LlmError>>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(script: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn complete(&self, _request: &LlmRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| LlmError::BackendUnavailable("script lock poisoned".to_string()))?;
        if let Some(outcome) = next {
            *last = Some(outcome);
        }
        last.clone()
            .unwrap_or_else(|| Err(LlmError::BackendUnavailable("empty script".to_string())))
    }
}
