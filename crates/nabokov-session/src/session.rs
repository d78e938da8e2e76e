//! The optimistic generation lifecycle shared by every feature.
//!
//! ```text
//! begin ──► Skeleton ──► Streaming ──► Committed
//!                            │    └──► Failed
//!                            └───────► Cancelled
//! ```
//!
//! The skeleton is written before `begin` returns. The card id and its
//! structural fields (parent, title, position, size) are fixed from then on.
//! Exactly one finalizing write follows: commit or failure. Cancellation
//! drops the provider stream, which stops the underlying transport.

use crate::card::Card;
use crate::error::SessionError;
use crate::store::Store;
use futures::StreamExt;
use nabokov_provider::{
    GenerationOptions, GenerationService, GenerationStream, Message, ProviderError, StreamEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Placeholder content shown while a card is generating.
pub const DEFAULT_PLACEHOLDER: &str = "Generating…";

/// When partial output is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingMode {
    /// Persist partial output at most once per interval.
    Live { flush_interval: Duration },
    /// Persist only the final result.
    Buffered,
}

/// What happens to the card when a session is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelBehavior {
    /// Leave the card as last persisted.
    KeepSkeleton,
    /// Remove the card from the store.
    DeleteSkeleton,
    /// Write the card back with the content it had before the session began.
    Restore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Skeleton content. `None` keeps the card's current content.
    pub placeholder: Option<String>,
    pub mode: StreamingMode,
    pub on_cancel: CancelBehavior,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            placeholder: Some(DEFAULT_PLACEHOLDER.to_string()),
            mode: StreamingMode::Buffered,
            on_cancel: CancelBehavior::KeepSkeleton,
        }
    }
}

impl SessionConfig {
    pub fn live(flush_interval: Duration) -> Self {
        Self {
            mode: StreamingMode::Live { flush_interval },
            ..Default::default()
        }
    }
}

/// Decides what the card looks like while streaming and once done.
pub trait ContentStrategy: Send + Sync + 'static {
    /// Content persisted for partial output in live mode.
    fn preview(&self, _card: &Card, partial: &str) -> String {
        partial.to_string()
    }

    /// Apply the final text to the card.
    fn finalize(self: Box<Self>, card: &mut Card, text: &str);

    /// Content persisted when generation fails.
    fn fail(self: Box<Self>, card: &mut Card, err: &ProviderError) {
        card.content = format!("Generation failed: {}", err.user_message());
    }
}

/// Store the final text as-is.
pub struct RawText;

impl ContentStrategy for RawText {
    fn finalize(self: Box<Self>, card: &mut Card, text: &str) {
        card.content = text.to_string();
    }
}

struct FnStrategy<F>(F);

impl<F> ContentStrategy for FnStrategy<F>
where
    F: FnOnce(&mut Card, &str) + Send + Sync + 'static,
{
    fn finalize(self: Box<Self>, card: &mut Card, text: &str) {
        (self.0)(card, text)
    }
}

/// Wrap a closure as a [`ContentStrategy`].
pub fn finalize_with<F>(f: F) -> Box<dyn ContentStrategy>
where
    F: FnOnce(&mut Card, &str) + Send + Sync + 'static,
{
    Box::new(FnStrategy(f))
}

/// How a session ended, when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Committed(Card),
    /// Carries the card as it was when cancelled.
    Cancelled(Card),
}

impl SessionOutcome {
    pub fn card(&self) -> &Card {
        match self {
            SessionOutcome::Committed(card) | SessionOutcome::Cancelled(card) => card,
        }
    }
}

/// Handle used to cancel a running session.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A session whose skeleton has been written.
#[derive(Debug)]
pub struct RunningSession {
    card_id: String,
    cancel: CancelHandle,
    task: JoinHandle<Result<SessionOutcome, SessionError>>,
}

impl RunningSession {
    /// Id of the card this session owns.
    pub fn card_id(&self) -> &str {
        &self.card_id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session to commit, fail, or be cancelled.
    pub async fn wait(self) -> Result<SessionOutcome, SessionError> {
        self.task
            .await
            .map_err(|e| SessionError::Join(e.to_string()))?
    }
}

/// Drives generations into cards.
#[derive(Clone)]
pub struct GenerationSession {
    service: Arc<GenerationService>,
    store: Arc<dyn Store>,
    config: SessionConfig,
}

impl GenerationSession {
    pub fn new(service: Arc<GenerationService>, store: Arc<dyn Store>) -> Self {
        Self {
            service,
            store,
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn service(&self) -> &GenerationService {
        &self.service
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Validate, write the skeleton, and start streaming in the background.
    ///
    /// Validation errors are returned before anything is written.
    pub async fn begin(
        &self,
        mut skeleton: Card,
        messages: Vec<Message>,
        options: GenerationOptions,
        strategy: Box<dyn ContentStrategy>,
    ) -> Result<RunningSession, SessionError> {
        let prepared = self
            .service
            .prepare(&messages, &options)
            .map_err(SessionError::Validation)?;

        let original_content = skeleton.content.clone();
        skeleton.is_generating = true;
        skeleton.error_detail = None;
        if let Some(placeholder) = &self.config.placeholder {
            skeleton.content = placeholder.clone();
        }
        skeleton.touch();
        self.store.put(skeleton.clone()).await?;
        tracing::debug!(
            card = %skeleton.id,
            provider = %prepared.metadata.provider,
            "generation skeleton written"
        );

        let (tx, rx) = watch::channel(false);
        let card_id = skeleton.id.clone();
        let driver = Driver {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            card: skeleton,
            original_content,
            strategy,
        };
        let stream = GenerationService::stream_prepared(prepared);
        let task = tokio::spawn(driver.run(stream, rx));

        Ok(RunningSession {
            card_id,
            cancel: CancelHandle { tx: Arc::new(tx) },
            task,
        })
    }

    /// `begin` followed by `wait`.
    pub async fn run(
        &self,
        skeleton: Card,
        messages: Vec<Message>,
        options: GenerationOptions,
        strategy: Box<dyn ContentStrategy>,
    ) -> Result<SessionOutcome, SessionError> {
        self.begin(skeleton, messages, options, strategy)
            .await?
            .wait()
            .await
    }
}

enum Step {
    Cancelled,
    Flush,
    Event(Option<StreamEvent>),
}

struct Driver {
    store: Arc<dyn Store>,
    config: SessionConfig,
    card: Card,
    /// Card content before the skeleton was written.
    original_content: String,
    strategy: Box<dyn ContentStrategy>,
}

impl Driver {
    async fn run(
        self,
        mut stream: GenerationStream,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<SessionOutcome, SessionError> {
        let flush_interval = match self.config.mode {
            StreamingMode::Live { flush_interval } => Some(flush_interval),
            StreamingMode::Buffered => None,
        };
        let mut text = String::new();
        let mut last_flush = Instant::now();
        let mut flushed: Option<Card> = None;
        // Tokens received since the last flush.
        let mut pending = false;

        loop {
            let flush_at = last_flush + flush_interval.unwrap_or_default();
            let step = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => Step::Cancelled,
                event = stream.next() => Step::Event(event),
                _ = tokio::time::sleep_until(flush_at), if pending => Step::Flush,
            };

            let event = match step {
                Step::Cancelled => {
                    // Dropping the stream stops the transport.
                    drop(stream);
                    return self.cancel(flushed).await;
                }
                Step::Flush => {
                    flushed = Some(self.flush(&text).await?);
                    last_flush = Instant::now();
                    pending = false;
                    continue;
                }
                Step::Event(event) => event,
            };

            match event {
                Some(StreamEvent::Token { text: chunk }) => {
                    text.push_str(&chunk);
                    if let Some(interval) = flush_interval {
                        if last_flush.elapsed() >= interval {
                            flushed = Some(self.flush(&text).await?);
                            last_flush = Instant::now();
                            pending = false;
                        } else {
                            pending = true;
                        }
                    }
                }
                Some(StreamEvent::Done { final_text }) => {
                    return self.commit(final_text.unwrap_or(text)).await;
                }
                Some(StreamEvent::Error(err)) => return self.fail(err).await,
                None => {
                    return self
                        .fail(ProviderError::IncompleteStream(
                            "generation stream ended without a terminal event".to_string(),
                        ))
                        .await
                }
            }
        }
    }

    /// Persist partial output as a preview of the card.
    async fn flush(&self, text: &str) -> Result<Card, SessionError> {
        let mut partial = self.card.clone();
        partial.content = self.strategy.preview(&self.card, text);
        partial.touch();
        self.store.put(partial.clone()).await?;
        Ok(partial)
    }

    async fn commit(self, text: String) -> Result<SessionOutcome, SessionError> {
        let Driver {
            store,
            mut card,
            strategy,
            ..
        } = self;
        strategy.finalize(&mut card, &text);
        card.is_generating = false;
        card.error_detail = None;
        card.touch();
        store.put(card.clone()).await?;
        tracing::info!(card = %card.id, chars = text.len(), "generation committed");
        Ok(SessionOutcome::Committed(card))
    }

    async fn fail(self, err: ProviderError) -> Result<SessionOutcome, SessionError> {
        let Driver {
            store,
            mut card,
            strategy,
            ..
        } = self;
        strategy.fail(&mut card, &err);
        card.error_detail = Some(err.to_string());
        card.is_generating = false;
        card.touch();
        store.put(card.clone()).await?;
        tracing::warn!(card = %card.id, code = err.code(), error = %err, "generation failed");
        Err(SessionError::Generation {
            card_id: card.id,
            source: err,
        })
    }

    async fn cancel(self, flushed: Option<Card>) -> Result<SessionOutcome, SessionError> {
        let card = match self.config.on_cancel {
            CancelBehavior::KeepSkeleton => {
                let card = flushed.unwrap_or(self.card);
                tracing::info!(card = %card.id, "generation cancelled, card kept");
                card
            }
            CancelBehavior::DeleteSkeleton => {
                let card = flushed.unwrap_or(self.card);
                self.store.delete(&card.id).await?;
                tracing::info!(card = %card.id, "generation cancelled, card deleted");
                card
            }
            CancelBehavior::Restore => {
                let mut card = self.card;
                card.content = self.original_content;
                card.is_generating = false;
                card.touch();
                self.store.put(card.clone()).await?;
                tracing::info!(card = %card.id, "generation cancelled, card restored");
                card
            }
        };
        Ok(SessionOutcome::Cancelled(card))
    }
}

/// Resolves once cancellation is requested. Never resolves if the handle is
/// dropped without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
