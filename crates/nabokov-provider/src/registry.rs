//! Provider registry and the generation service built on top of it.

use crate::error::ProviderError;
use crate::prompt::{build_prompt, has_multimodal, validate_messages};
use crate::stream::Terminated;
use crate::traits::{Provider, StreamObserver};
use crate::types::{
    now_millis, EventStream, GenerationOptions, Message, Metadata, ProviderRequest,
    ProviderResponse, StreamEvent,
};
use futures::stream::{FusedStream, Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Default key used when nothing else selects a provider.
pub const DEFAULT_PROVIDER_KEY: &str = "codex";

/// Key selected by the "use alternate" flag.
pub const ALTERNATE_PROVIDER_KEY: &str = "claude";

/// Registry of providers by key.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under a key. Keys are stored lower-cased.
    pub fn register(&mut self, key: impl Into<String>, provider: Arc<dyn Provider>) {
        let key = key.into().to_ascii_lowercase();
        tracing::debug!(key = %key, provider = provider.name(), "registered provider");
        self.providers.insert(key, provider);
    }

    /// Look up a provider by key (case-insensitive).
    pub fn get(&self, key: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(&key.to_ascii_lowercase()).cloned()
    }

    /// Check if a key is registered (case-insensitive).
    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(&key.to_ascii_lowercase())
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.providers.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider resolution policy.
///
/// Precedence: explicit override, then configured key, then the alternate
/// flag, then the default key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    /// Caller override. Must name a registered key.
    pub explicit: Option<String>,
    /// Configured key (e.g. from `LLM_PROVIDER`). Ignored if not registered.
    pub configured: Option<String>,
    /// Prefer `alternate_key` over `default_key`.
    pub use_alternate: bool,
    pub alternate_key: String,
    pub default_key: String,
}

impl Default for ProviderSelection {
    fn default() -> Self {
        Self {
            explicit: None,
            configured: None,
            use_alternate: false,
            alternate_key: ALTERNATE_PROVIDER_KEY.to_string(),
            default_key: DEFAULT_PROVIDER_KEY.to_string(),
        }
    }
}

impl ProviderSelection {
    /// Resolve the active key against a registry.
    pub fn resolve(&self, registry: &ProviderRegistry) -> Result<String, ProviderError> {
        if let Some(explicit) = self.explicit.as_deref() {
            let key = explicit.trim().to_ascii_lowercase();
            if registry.contains(&key) {
                return Ok(key);
            }
            return Err(ProviderError::UnknownProvider(key));
        }

        if let Some(configured) = self.configured.as_deref() {
            let key = configured.trim().to_ascii_lowercase();
            if registry.contains(&key) {
                return Ok(key);
            }
            if !key.is_empty() {
                tracing::warn!(key = %key, "configured provider is not registered, ignoring");
            }
        }

        if self.use_alternate && registry.contains(&self.alternate_key) {
            return Ok(self.alternate_key.to_ascii_lowercase());
        }

        if registry.contains(&self.default_key) {
            return Ok(self.default_key.to_ascii_lowercase());
        }

        Err(ProviderError::UnknownProvider(self.default_key.clone()))
    }
}

/// A validated request, ready to dispatch.
pub struct PreparedRequest {
    pub provider: Arc<dyn Provider>,
    pub request: ProviderRequest,
    pub metadata: Metadata,
}

/// Validates input, builds prompts, and dispatches to the selected provider.
pub struct GenerationService {
    registry: ProviderRegistry,
    key: String,
    provider: Arc<dyn Provider>,
}

impl GenerationService {
    /// Resolve the active provider once and build the service.
    pub fn new(
        registry: ProviderRegistry,
        selection: &ProviderSelection,
    ) -> Result<Self, ProviderError> {
        let key = selection.resolve(&registry)?;
        let provider = registry
            .get(&key)
            .ok_or_else(|| ProviderError::UnknownProvider(key.clone()))?;
        tracing::info!(key = %key, provider = provider.name(), "generation provider selected");
        Ok(Self {
            registry,
            key,
            provider,
        })
    }

    /// Key of the active provider.
    pub fn provider_key(&self) -> &str {
        &self.key
    }

    /// Name of the active provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Validate, build the prompt and apply model policy. Performs no I/O.
    pub fn prepare(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<PreparedRequest, ProviderError> {
        validate_messages(messages)?;
        if has_multimodal(messages) {
            return Err(ProviderError::UnsupportedMultimodal);
        }

        let (key, provider) = match options.provider_key.as_deref() {
            Some(key) => {
                let key = key.to_ascii_lowercase();
                let provider = self
                    .registry
                    .get(&key)
                    .ok_or_else(|| ProviderError::UnknownProvider(key.clone()))?;
                (key, provider)
            }
            None => (self.key.clone(), Arc::clone(&self.provider)),
        };

        let selection = provider.select_model(options);
        let prompt = build_prompt(messages, options.system.as_deref());

        let metadata = Metadata {
            provider: provider.name().to_string(),
            provider_key: key,
            source: provider.name().to_string(),
            timestamp: options.timestamp.unwrap_or_else(now_millis),
            requested_model: selection.requested.clone(),
            resolved_model: selection.resolved,
            extra: Default::default(),
        };

        let mut provider_options = options.provider_options.clone();
        if selection.forwarded.is_some() {
            provider_options.model = selection.forwarded.clone();
        }

        Ok(PreparedRequest {
            provider,
            request: ProviderRequest {
                prompt,
                model: selection.forwarded,
                requested_model: selection.requested,
                options: provider_options,
            },
            metadata,
        })
    }

    /// One-shot generation.
    pub async fn send_message(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let prepared = self.prepare(messages, options)?;
        tracing::debug!(
            provider = %prepared.metadata.provider,
            model = %prepared.metadata.resolved_model,
            "sending message"
        );
        let content = prepared.provider.send(prepared.request).await?;
        Ok(ProviderResponse {
            content,
            metadata: prepared.metadata,
        })
    }

    /// Streaming generation. Validation errors are returned before any
    /// provider work starts.
    pub fn stream_message(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GenerationStream, ProviderError> {
        let prepared = self.prepare(messages, options)?;
        Ok(Self::stream_prepared(prepared))
    }

    /// Start streaming an already prepared request.
    pub fn stream_prepared(prepared: PreparedRequest) -> GenerationStream {
        tracing::debug!(
            provider = %prepared.metadata.provider,
            model = %prepared.metadata.resolved_model,
            "streaming message"
        );
        let events = prepared.provider.stream(prepared.request);
        GenerationStream {
            metadata: prepared.metadata,
            events: Terminated::new(events),
        }
    }

    /// Callback-style streaming.
    ///
    /// Returns `Err` only for validation failures, before any callback fires.
    /// Transport failures go to `on_error`.
    pub async fn stream_to(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        observer: &mut dyn StreamObserver,
    ) -> Result<Metadata, ProviderError> {
        let mut stream = self.stream_message(messages, options)?;
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Token { text } => observer.on_token(&text),
                StreamEvent::Done { .. } => observer.on_done(stream.metadata()),
                StreamEvent::Error(err) => observer.on_error(err),
            }
        }
        Ok(stream.metadata)
    }
}

/// A running generation: response metadata plus the event stream.
pub struct GenerationStream {
    metadata: Metadata,
    events: Terminated<EventStream>,
}

impl GenerationStream {
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl Stream for GenerationStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.events.poll_next_unpin(cx)
    }
}

impl FusedStream for GenerationStream {
    fn is_terminated(&self) -> bool {
        self.events.is_terminated()
    }
}
