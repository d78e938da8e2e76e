//! Common types shared by the provider trait, the registry and the adapters.

use crate::error::ProviderError;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Label used when the message is flattened into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Assistant => "Assistant",
            Role::User | Role::System => "User",
        }
    }
}

/// Message content: plain text, or an array of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Value>),
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    /// True if the content is an array of blocks.
    pub fn is_multimodal(&self) -> bool {
        matches!(self.content, MessageContent::Blocks(_))
    }
}

/// Provider-specific passthrough options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderOptions {
    /// Model override understood only by this provider.
    pub model: Option<String>,
    /// Named profile (subprocess only).
    pub profile: Option<String>,
    /// `key=value` overrides passed as `--config` flags (subprocess only).
    pub config_overrides: Vec<String>,
    /// Arguments appended verbatim to the command line (subprocess only).
    pub extra_args: Vec<String>,
}

/// Options accepted by a generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationOptions {
    /// Instruction text prepended to the prompt.
    pub system: Option<String>,
    /// Logical model name; a per-provider default applies when absent.
    pub model: Option<String>,
    /// Dispatch this call to another registered provider.
    pub provider_key: Option<String>,
    /// Passthrough options for the adapter.
    pub provider_options: ProviderOptions,
    /// Caller-supplied timestamp (ms since epoch) for the response metadata.
    pub timestamp: Option<u64>,
    /// Anything else the caller sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerationOptions {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Outcome of a provider's model policy for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    /// What the caller asked for (after provider defaults, if the provider applies them).
    pub requested: Option<String>,
    /// What the provider will actually run.
    pub resolved: String,
    /// What is handed to the transport, if anything.
    pub forwarded: Option<String>,
}

/// Request handed to an adapter once validation and prompt building are done.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    /// Flattened prompt text.
    pub prompt: String,
    /// Model passed to the transport.
    pub model: Option<String>,
    /// Model the caller asked for, used to enrich transport errors.
    pub requested_model: Option<String>,
    /// Provider-specific passthrough options.
    pub options: ProviderOptions,
}

impl ProviderRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Metadata attached to every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Adapter name, e.g. `codex-cli`.
    pub provider: String,
    /// Registry key the adapter was selected under.
    pub provider_key: String,
    /// Same as `provider`; kept for consumers that tag entities by source.
    pub source: String,
    /// Milliseconds since the unix epoch.
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_model: Option<String>,
    pub resolved_model: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One-shot generation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub metadata: Metadata,
}

/// Events produced by a streaming generation.
///
/// A well-formed stream is zero or more `Token`s followed by exactly one
/// `Done` or `Error`.
#[derive(Debug)]
pub enum StreamEvent {
    /// A chunk of generated text.
    Token { text: String },

    /// Successful end of the stream. `final_text`, when present, is the
    /// authoritative full response and replaces the accumulated tokens.
    Done { final_text: Option<String> },

    /// Failed end of the stream.
    Error(ProviderError),
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        Self::Token { text: text.into() }
    }

    pub fn done() -> Self {
        Self::Done { final_text: None }
    }

    /// True for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token { .. })
    }
}

/// Boxed stream of generation events.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
