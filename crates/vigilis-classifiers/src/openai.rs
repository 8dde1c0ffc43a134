//! OpenAI-compatible chat completions backend
//!
//! Sends a single user message and reads back the first choice:
//! ```text
//! POST {base_url}/chat/completions
//! {"model":"...","temperature":0,"messages":[{"role":"user","content":"..."}]}
//!
//! {"id":"chatcmpl-xxx","choices":[{"index":0,"message":{"role":"assistant","content":"..."}}]}
//! ```

use crate::classifier::CompletionBackend;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use vigilis_core::{Error, Result};

/// Chat completions client
#[derive(Debug, Clone)]
pub struct ChatCompletionBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatCompletionBackend {
    /// Create a backend for `base_url` (e.g. `https://api.openai.com/v1`)
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Full request URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;
        debug!(status = status.as_u16(), bytes = body.len(), "Chat completion response");

        if !status.is_success() {
            return Err(map_status(status, &body));
        }

        extract_content(&body)
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}

/// Backend used when the reasoning tier is switched off or has no key
#[derive(Debug, Clone)]
pub struct DisabledBackend {
    reason: String,
}

impl DisabledBackend {
    /// Create a backend that always refuses with `reason`
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CompletionBackend for DisabledBackend {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::UpstreamAuth(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::UpstreamTimeout
    } else {
        Error::upstream(format!("transport failure: {}", e), e.is_connect() || e.is_request())
    }
}

/// Translate a non-success status into the upstream error taxonomy
pub fn map_status(status: StatusCode, body: &str) -> Error {
    let snippet: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::UpstreamAuth(format!("{}: {}", status, snippet))
        }
        StatusCode::TOO_MANY_REQUESTS => Error::UpstreamRateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Error::UpstreamTimeout,
        s if s.is_server_error() => Error::upstream(format!("{}: {}", status, snippet), true),
        _ => Error::upstream(format!("{}: {}", status, snippet), false),
    }
}

/// Pull the assistant message text out of a response body
pub fn extract_content(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::malformed(format!("invalid completion body: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| Error::malformed("completion has no content"))
}

// =============================================================================
// Chat Completions Wire Structures
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
