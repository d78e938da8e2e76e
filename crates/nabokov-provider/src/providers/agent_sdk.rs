//! In-process SDK adapter.
//!
//! The SDK yields structured messages: `assistant` messages carrying content
//! blocks, and a single `result` message that ends the query. This adapter
//! turns that sequence into the uniform event stream.

use crate::error::ProviderError;
use crate::prompt::extract_text_blocks;
use crate::traits::Provider;
use crate::types::{EventStream, GenerationOptions, ModelSelection, ProviderRequest, StreamEvent};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Default logical model.
pub const DEFAULT_CLAUDE_MODEL: &str = "sonnet";

const KNOWN_MODELS: [&str; 3] = ["sonnet", "haiku", "opus"];

/// Options passed to every SDK query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOptions {
    pub model: Option<String>,
    pub permission_mode: String,
    pub allowed_tools: Vec<String>,
    pub setting_sources: Vec<String>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            model: None,
            permission_mode: "bypassPermissions".to_string(),
            allowed_tools: Vec::new(),
            setting_sources: Vec::new(),
        }
    }
}

/// Structured message yielded by an SDK query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SdkMessage {
    Assistant {
        message: AssistantMessage,
    },
    Result {
        subtype: ResultSubtype,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl SdkMessage {
    /// Assistant message with a single text block.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            message: AssistantMessage {
                content: vec![serde_json::json!({"type": "text", "text": text.into()})],
            },
        }
    }

    pub fn success(result: Option<String>) -> Self {
        Self::Result {
            subtype: ResultSubtype::Success,
            result,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Result {
            subtype: ResultSubtype::Error,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<Value>,
}

/// `success`, or any error subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSubtype {
    Success,
    #[serde(other)]
    Error,
}

/// Stream of SDK messages.
pub type SdkMessageStream = BoxStream<'static, Result<SdkMessage, ProviderError>>;

/// An SDK capable of running a query.
#[async_trait]
pub trait AgentSdk: Send + Sync {
    async fn query(
        &self,
        prompt: String,
        options: AgentOptions,
    ) -> Result<SdkMessageStream, ProviderError>;
}

/// Map any model name containing a known family to that family.
pub fn normalize_model_name(requested: &str, default_model: &str) -> String {
    let lower = requested.to_ascii_lowercase();
    KNOWN_MODELS
        .iter()
        .find(|family| lower.contains(*family))
        .map(|family| family.to_string())
        .unwrap_or_else(|| default_model.to_string())
}

/// Provider backed by an [`AgentSdk`].
pub struct AgentSdkProvider {
    sdk: Arc<dyn AgentSdk>,
    default_model: String,
    options: AgentOptions,
}

impl AgentSdkProvider {
    pub fn new(sdk: Arc<dyn AgentSdk>) -> Self {
        Self {
            sdk,
            default_model: DEFAULT_CLAUDE_MODEL.to_string(),
            options: AgentOptions::default(),
        }
    }

    /// Override the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }
}

impl Provider for AgentSdkProvider {
    fn name(&self) -> &str {
        "claude-agent-sdk"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn select_model(&self, options: &GenerationOptions) -> ModelSelection {
        let requested = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let resolved = normalize_model_name(&requested, &self.default_model);
        ModelSelection {
            requested: Some(requested),
            forwarded: Some(resolved.clone()),
            resolved,
        }
    }

    fn stream(&self, request: ProviderRequest) -> EventStream {
        let mut options = self.options.clone();
        options.model = request.model.or_else(|| Some(self.default_model.clone()));
        let state = QueryState::Pending {
            sdk: Arc::clone(&self.sdk),
            prompt: request.prompt,
            options,
        };
        stream::unfold(state, next_event).boxed()
    }
}

enum QueryState {
    Pending {
        sdk: Arc<dyn AgentSdk>,
        prompt: String,
        options: AgentOptions,
    },
    Reading(SdkMessageStream),
    Finished,
}

async fn next_event(state: QueryState) -> Option<(StreamEvent, QueryState)> {
    let mut messages = match state {
        QueryState::Pending {
            sdk,
            prompt,
            options,
        } => {
            tracing::debug!(model = ?options.model, "starting SDK query");
            match sdk.query(prompt, options).await {
                Ok(messages) => messages,
                Err(err) => return Some((StreamEvent::Error(err), QueryState::Finished)),
            }
        }
        QueryState::Reading(messages) => messages,
        QueryState::Finished => return None,
    };

    while let Some(message) = messages.next().await {
        match message {
            Ok(SdkMessage::Assistant { message }) => {
                let text = extract_text_blocks(&message.content);
                if !text.is_empty() {
                    return Some((StreamEvent::token(text), QueryState::Reading(messages)));
                }
            }
            Ok(SdkMessage::Result {
                subtype: ResultSubtype::Success,
                result,
                ..
            }) => {
                return Some((
                    StreamEvent::Done { final_text: result },
                    QueryState::Finished,
                ));
            }
            Ok(SdkMessage::Result { error, .. }) => {
                let message = error.unwrap_or_else(|| "Agent SDK returned an error".to_string());
                tracing::debug!(error = %message, "SDK query failed");
                return Some((
                    StreamEvent::Error(ProviderError::Transport(message)),
                    QueryState::Finished,
                ));
            }
            Ok(SdkMessage::Other) => {}
            Err(err) => return Some((StreamEvent::Error(err), QueryState::Finished)),
        }
    }

    Some((
        StreamEvent::Error(ProviderError::IncompleteStream(
            "Agent SDK query did not complete".to_string(),
        )),
        QueryState::Finished,
    ))
}
