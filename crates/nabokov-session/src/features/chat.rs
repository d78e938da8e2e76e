//! Chat about a card, answered into a chat card.

use crate::card::{Card, CardMetadata, CardType, ConversationEntry};
use crate::error::SessionError;
use crate::features::card_generation::position_beside;
use crate::html::{escape_html, html_to_text};
use crate::session::{ContentStrategy, GenerationSession, RunningSession, StreamingMode};
use nabokov_provider::{GenerationOptions, Message, Role};
use std::time::Duration;

pub const CHAT_SYSTEM_PROMPT: &str = "You are a helpful assistant analyzing web content.";

/// Appended to the transcript when the user stops a reply.
pub const STOPPED_MARKER: &str = "[Response stopped by user]";
/// Shown in place of a reply that failed.
pub const ERROR_MARKER: &str = "[Error generating response]";

/// Flush cadence for replies when the session itself is buffered.
pub const CHAT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Empty chat card attached to `source`.
pub fn chat_card_for(source: &Card) -> Card {
    let mut card = Card::new(CardType::Chat);
    card.parent_card_id = Some(source.id.clone());
    card.metadata = CardMetadata {
        title: format!("Chat: {}", source.title()),
        domain: source.metadata.domain.clone(),
        url: source.metadata.url.clone(),
        favicon: None,
    };
    card.position = Some(position_beside(source));
    card
}

/// Model input for a new question: prior turns, then the question with the
/// source content inlined.
pub fn chat_messages(source: &Card, history: &[ConversationEntry], question: &str) -> Vec<Message> {
    let mut messages: Vec<Message> = history
        .iter()
        .map(|entry| match entry.role {
            Role::Assistant => Message::assistant(entry.content.clone()),
            _ => Message::user(entry.content.clone()),
        })
        .collect();
    messages.push(Message::user(format!(
        "Context: {}\n\nUser: {}",
        html_to_text(&source.content),
        question
    )));
    messages
}

/// Render a conversation as HTML.
pub fn render_transcript(conversation: &[ConversationEntry]) -> String {
    conversation
        .iter()
        .map(|entry| render_entry(entry.role, &entry.content))
        .collect()
}

fn render_entry(role: Role, content: &str) -> String {
    let class = match role {
        Role::Assistant => "assistant",
        _ => "user",
    };
    format!(
        "<div class=\"chat-{class}\"><strong>{}:</strong> {}</div>",
        role.label(),
        escape_html(content).replace('\n', "<br>")
    )
}

struct ChatReply {
    question: String,
}

impl ContentStrategy for ChatReply {
    fn preview(&self, card: &Card, partial: &str) -> String {
        let mut html = render_transcript(&card.conversation);
        html.push_str(&render_entry(Role::User, &self.question));
        html.push_str(&render_entry(Role::Assistant, partial));
        html
    }

    fn finalize(self: Box<Self>, card: &mut Card, text: &str) {
        card.conversation
            .push(ConversationEntry::new(Role::User, self.question));
        card.conversation
            .push(ConversationEntry::new(Role::Assistant, text));
        card.content = render_transcript(&card.conversation);
    }
}

/// Ask a question in `chat`, a chat card whose parent is `source`.
///
/// The chat card keeps its id and layout. Replies always stream live: its
/// content shows the transcript plus the partial reply while streaming. A
/// buffered session is switched to [`CHAT_FLUSH_INTERVAL`].
pub async fn ask(
    session: &GenerationSession,
    source: &Card,
    chat: Card,
    question: &str,
) -> Result<RunningSession, SessionError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(SessionError::Precondition(
            "Question must not be empty".to_string(),
        ));
    }
    let messages = chat_messages(source, &chat.conversation, question);
    let options = GenerationOptions::default().with_system(CHAT_SYSTEM_PROMPT);
    tracing::debug!(chat = %chat.id, source = %source.id, turns = chat.conversation.len(), "chat question");

    let session = match session.config().mode {
        StreamingMode::Live { .. } => session.clone(),
        StreamingMode::Buffered => {
            let mut config = session.config().clone();
            config.mode = StreamingMode::Live {
                flush_interval: CHAT_FLUSH_INTERVAL,
            };
            session.clone().with_config(config)
        }
    };
    session
        .begin(
            chat,
            messages,
            options,
            Box::new(ChatReply {
                question: question.to_string(),
            }),
        )
        .await
}

/// Card content after a stopped reply: the transcript, the question, and
/// whatever arrived, followed by the stop marker.
pub fn stopped_transcript(chat: &Card, question: &str, partial: &str) -> String {
    let mut html = render_transcript(&chat.conversation);
    html.push_str(&render_entry(Role::User, question));
    let reply = if partial.is_empty() {
        STOPPED_MARKER.to_string()
    } else {
        format!("{partial}\n\n{STOPPED_MARKER}")
    };
    html.push_str(&render_entry(Role::Assistant, &reply));
    html
}

/// Card content after a failed reply.
pub fn failed_transcript(chat: &Card, question: &str) -> String {
    let mut html = render_transcript(&chat.conversation);
    html.push_str(&render_entry(Role::User, question));
    html.push_str(&render_entry(Role::Assistant, ERROR_MARKER));
    html
}
