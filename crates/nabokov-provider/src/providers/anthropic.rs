//! Anthropic Messages API backend for the SDK adapter.
//!
//! Streams `/v1/messages` over SSE and translates the events into
//! [`SdkMessage`]s so the SDK adapter can treat it like any other SDK.

use super::agent_sdk::{AgentOptions, AgentSdk, SdkMessage, SdkMessageStream};
use crate::error::ProviderError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

const API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 8_192;

/// Full API model id for a logical model name. Unknown names pass through.
pub fn api_model_id(model: &str) -> &str {
    match model {
        "sonnet" => "claude-sonnet-4-20250514",
        "opus" => "claude-opus-4-20250514",
        "haiku" => "claude-3-5-haiku-20241022",
        other => other,
    }
}

/// SDK backend speaking the Anthropic Messages API.
pub struct AnthropicSdk {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    max_tokens: usize,
}

impl AnthropicSdk {
    /// Create a backend. A missing key is reported when a query is made.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: API_BASE.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Create with a custom base URL (for testing/proxy).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request_body(&self, prompt: &str, options: &AgentOptions) -> Value {
        let model = options.model.as_deref().unwrap_or("sonnet");
        json!({
            "model": api_model_id(model),
            "max_tokens": self.max_tokens,
            "stream": true,
            "messages": [{
                "role": "user",
                "content": [{"type": "text", "text": prompt}],
            }],
        })
    }
}

#[async_trait]
impl AgentSdk for AnthropicSdk {
    async fn query(
        &self,
        prompt: String,
        options: AgentOptions,
    ) -> Result<SdkMessageStream, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::Auth("ANTHROPIC_API_KEY is not set".to_string()))?;

        let body = self.build_request_body(&prompt, &options);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {status}: {error_body}");
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::Auth(message),
                _ => ProviderError::Transport(message),
            });
        }

        // Raw bytes: a chunk may end inside a multi-byte character.
        let mut buffer: Vec<u8> = Vec::new();
        let messages = response
            .bytes_stream()
            .map(move |chunk| -> Vec<Result<SdkMessage, ProviderError>> {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => return vec![Err(ProviderError::Http(err))],
                };
                buffer.extend_from_slice(&chunk);
                drain_events(&mut buffer)
                    .iter()
                    .filter_map(translate_event)
                    .map(Ok)
                    .collect()
            })
            .flat_map(stream::iter);

        Ok(messages.boxed())
    }
}

/// Pop every complete SSE event from the buffer. Only whole events are
/// decoded; a trailing partial event stays buffered as raw bytes.
fn drain_events(buffer: &mut Vec<u8>) -> Vec<ApiEvent> {
    let mut events = Vec::new();
    while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
        let raw: Vec<u8> = buffer.drain(..pos + 2).collect();
        let block = String::from_utf8_lossy(&raw);
        for line in block.lines() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            match serde_json::from_str::<ApiEvent>(data) {
                Ok(event) => events.push(event),
                Err(err) => tracing::debug!(error = %err, "skipping unparseable SSE event"),
            }
        }
    }
    events
}

fn translate_event(event: &ApiEvent) -> Option<SdkMessage> {
    match event {
        ApiEvent::ContentBlockDelta {
            delta: Delta::Text { text },
        } => Some(SdkMessage::assistant_text(text.clone())),
        ApiEvent::MessageStop => Some(SdkMessage::success(None)),
        ApiEvent::Error { error } => Some(SdkMessage::failure(format!(
            "{}: {}",
            error.error_type, error.message
        ))),
        _ => None,
    }
}

// ──────────────────────────────────────────────────────────
// Messages API SSE event types (internal)
// ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiEvent {
    ContentBlockDelta {
        delta: Delta,
    },
    MessageStop,
    Error {
        error: ErrorData,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Delta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}
