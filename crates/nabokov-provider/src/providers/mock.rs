//! Offline provider for development and tests.
//!
//! `echo` streams the last user turn of the prompt back in word-sized
//! chunks. `scripted` replays a fixed token list and outcome.

use crate::error::ProviderError;
use crate::traits::Provider;
use crate::types::{EventStream, ProviderRequest, StreamEvent};
use futures::stream::{self, StreamExt};
use std::sync::Mutex;
use std::time::Duration;

const DEFAULT_NAME: &str = "mock";

/// How a scripted stream ends.
#[derive(Debug, Clone)]
pub enum ScriptEnd {
    /// Emit `Done` with an optional authoritative text.
    Done(Option<String>),
    /// Emit a `Transport` error with this message.
    Error(String),
    /// End the stream with no terminal event.
    Truncate,
    /// Never end.
    Hang,
}

enum Mode {
    Echo,
    Scripted { tokens: Vec<String>, end: ScriptEnd },
}

/// Offline provider.
pub struct MockProvider {
    name: String,
    mode: Mode,
    delay: Option<Duration>,
    prompts: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    /// Echo the final user turn back.
    pub fn echo() -> Self {
        Self::with_mode(Mode::Echo)
    }

    /// Replay a fixed script.
    pub fn scripted<I, T>(tokens: I, end: ScriptEnd) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::with_mode(Mode::Scripted {
            tokens: tokens.into_iter().map(Into::into).collect(),
            end,
        })
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            mode,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Report a different adapter name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sleep before each event.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    fn script(&self, prompt: &str) -> (Vec<String>, ScriptEnd) {
        match &self.mode {
            Mode::Echo => (echo_chunks(prompt), ScriptEnd::Done(None)),
            Mode::Scripted { tokens, end } => (tokens.clone(), end.clone()),
        }
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        DEFAULT_NAME
    }

    fn stream(&self, request: ProviderRequest) -> EventStream {
        let (tokens, end) = self.script(&request.prompt);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request);
        }

        let mut events: Vec<StreamEvent> = tokens.into_iter().map(StreamEvent::token).collect();
        let hang = matches!(end, ScriptEnd::Hang);
        match end {
            ScriptEnd::Done(final_text) => events.push(StreamEvent::Done { final_text }),
            ScriptEnd::Error(message) => {
                events.push(StreamEvent::Error(ProviderError::Transport(message)))
            }
            ScriptEnd::Truncate | ScriptEnd::Hang => {}
        }

        let delay = self.delay;
        let events = stream::iter(events).then(move |event| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            event
        });

        if hang {
            events.chain(stream::pending()).boxed()
        } else {
            events.boxed()
        }
    }
}

/// Split the last `User:` turn of a prompt into word-sized chunks.
fn echo_chunks(prompt: &str) -> Vec<String> {
    let turn = prompt
        .rsplit("\n\n")
        .find_map(|part| part.strip_prefix("User: "))
        .unwrap_or(prompt);

    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in turn.chars() {
        current.push(ch);
        if ch.is_whitespace() {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
