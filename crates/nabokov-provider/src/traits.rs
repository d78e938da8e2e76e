//! Provider trait definition.

use crate::error::ProviderError;
use crate::types::{
    EventStream, GenerationOptions, Metadata, ModelSelection, ProviderRequest, StreamEvent,
};
use async_trait::async_trait;
use futures::StreamExt;

/// Trait for generation providers.
///
/// Adapters normalize their transport (in-process SDK, external process,
/// ...) into a single [`EventStream`]. Dropping the stream abandons the call.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Adapter name (e.g. "codex-cli", "claude-agent-sdk").
    fn name(&self) -> &str;

    /// Model used when the caller does not ask for one.
    fn default_model(&self) -> &str;

    /// Apply this provider's model policy to the caller's options.
    ///
    /// The default forwards whatever the caller asked for, reporting the
    /// provider default as the resolved model when nothing was requested.
    fn select_model(&self, options: &GenerationOptions) -> ModelSelection {
        let requested = options
            .model
            .clone()
            .or_else(|| options.provider_options.model.clone());
        ModelSelection {
            resolved: requested
                .clone()
                .unwrap_or_else(|| self.default_model().to_string()),
            forwarded: requested.clone(),
            requested,
        }
    }

    /// Start a streaming generation.
    fn stream(&self, request: ProviderRequest) -> EventStream;

    /// Run a generation to completion and return the full text.
    async fn send(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        collect_text(self.stream(request)).await
    }
}

// Compile-time check: Provider must be object-safe
const _: () = {
    fn _assert_object_safe(_: &dyn Provider) {}
};

/// Drain a stream into its final text.
///
/// Tokens are concatenated; an authoritative `final_text` on `Done` wins.
/// A stream that ends without a terminal event is an `IncompleteStream`.
pub async fn collect_text(mut events: EventStream) -> Result<String, ProviderError> {
    let mut text = String::new();
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Token { text: chunk } => text.push_str(&chunk),
            StreamEvent::Done { final_text } => return Ok(final_text.unwrap_or(text)),
            StreamEvent::Error(err) => return Err(err),
        }
    }
    Err(ProviderError::IncompleteStream(
        "provider stream ended without a terminal event".to_string(),
    ))
}

/// Callback-style consumer of a generation stream.
///
/// At most one of `on_done` / `on_error` is called, exactly once, after
/// every `on_token`.
pub trait StreamObserver: Send {
    fn on_token(&mut self, text: &str);
    fn on_done(&mut self, metadata: &Metadata);
    fn on_error(&mut self, error: ProviderError);
}
