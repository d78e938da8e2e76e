//! Error types for the nabokov-provider crate.

use std::time::Duration;

/// Errors that can occur while validating or running a generation.
///
/// Validation variants (`InvalidRequest`, `UnsupportedMultimodal`,
/// `UnknownProvider`) are returned before any provider I/O happens. Everything
/// else is delivered as the terminal event of a stream.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Malformed input, caught before any I/O
    #[error("{0}")]
    InvalidRequest(String),

    /// Message content shape not supported by the active transport
    #[error("Multimodal messages not supported by current provider")]
    UnsupportedMultimodal,

    /// Transport rejected the requested model
    #[error("{message}")]
    UnsupportedModel {
        requested_model: Option<String>,
        message: String,
    },

    /// Provider process failed to spawn or exited unsuccessfully
    #[error("{message}")]
    ProcessFailure {
        message: String,
        exit_code: Option<i32>,
    },

    /// A protocol line could not be decoded
    #[error("failed to parse event: {raw}")]
    Protocol { raw: String, reason: String },

    /// Transport reported an error result
    #[error("{0}")]
    Transport(String),

    /// Transport ended without a terminal event
    #[error("{0}")]
    IncompleteStream(String),

    /// Provider call exceeded its deadline
    #[error("provider call timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// No provider registered under the requested key
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    /// Missing or rejected credentials
    #[error("Authentication error: {0}")]
    Auth(String),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Stable machine-readable code, used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::UnsupportedMultimodal => "UNSUPPORTED_MULTIMODAL",
            Self::UnsupportedModel { .. } => "UNSUPPORTED_MODEL",
            Self::ProcessFailure { .. } => "PROVIDER_PROCESS_FAILURE",
            Self::Protocol { .. } | Self::Serialization(_) => "PROVIDER_PROTOCOL_ERROR",
            Self::Transport(_) | Self::Http(_) | Self::Auth(_) => "PROVIDER_TRANSPORT_ERROR",
            Self::IncompleteStream(_) => "INCOMPLETE_STREAM",
            Self::Timeout(_) => "TIMEOUT",
            Self::UnknownProvider(_) => "UNKNOWN_PROVIDER",
        }
    }

    /// True for errors raised by request validation rather than by a transport.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::UnsupportedMultimodal | Self::UnknownProvider(_)
        )
    }

    /// Model name the caller asked for, when the transport rejected it.
    pub fn requested_model(&self) -> Option<&str> {
        match self {
            Self::UnsupportedModel {
                requested_model, ..
            } => requested_model.as_deref(),
            _ => None,
        }
    }

    /// Short sentence suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidRequest(msg) => msg.clone(),
            Self::UnsupportedMultimodal => self.to_string(),
            Self::UnsupportedModel {
                requested_model: Some(model),
                ..
            } => format!("The model '{model}' is not supported by the current provider."),
            Self::UnsupportedModel { .. } => {
                "The requested model is not supported by the current provider.".to_string()
            }
            Self::ProcessFailure { .. } => "The generation process exited unexpectedly.".to_string(),
            Self::Protocol { .. } | Self::Serialization(_) => {
                "The provider sent a response that could not be read.".to_string()
            }
            Self::Transport(msg) => format!("The provider reported an error: {msg}"),
            Self::IncompleteStream(_) => {
                "The provider stopped before finishing its response.".to_string()
            }
            Self::Timeout(_) => "The provider took too long to respond.".to_string(),
            Self::UnknownProvider(key) => format!("No provider named '{key}' is configured."),
            Self::Auth(_) => "The provider rejected the configured credentials.".to_string(),
            Self::Http(_) => "The provider could not be reached.".to_string(),
        }
    }

    /// Re-tag an error as `UnsupportedModel` when its message says so.
    pub fn tag_unsupported_model(self, requested_model: Option<&str>) -> Self {
        if matches!(self, Self::UnsupportedModel { .. }) || self.is_validation() {
            return self;
        }
        let message = self.to_string();
        if message.to_ascii_lowercase().contains("unsupported model") {
            Self::UnsupportedModel {
                requested_model: requested_model.map(str::to_string),
                message,
            }
        } else {
            self
        }
    }
}
