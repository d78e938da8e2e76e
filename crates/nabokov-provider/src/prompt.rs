//! Message validation and prompt flattening.
//!
//! All functions here are pure: no I/O, no global state.

use crate::error::ProviderError;
use crate::types::{Message, MessageContent, Role};
use serde_json::Value;

/// Parse an untyped JSON value into messages, reporting the first bad index.
pub fn parse_messages(value: &Value) -> Result<Vec<Message>, ProviderError> {
    let items = match value.as_array() {
        Some(items) if !items.is_empty() => items,
        _ => return Err(missing_messages()),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_message(index, item))
        .collect()
}

fn parse_message(index: usize, item: &Value) -> Result<Message, ProviderError> {
    let invalid = |reason: &str| {
        ProviderError::InvalidRequest(format!("Invalid message at index {index}: {reason}"))
    };

    let object = item.as_object().ok_or_else(|| invalid("must be an object"))?;

    let role = match object.get("role") {
        None | Some(Value::Null) => return Err(invalid("missing role")),
        Some(Value::String(role)) => match role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            other => return Err(invalid(&format!("unknown role '{other}'"))),
        },
        Some(_) => return Err(invalid("role must be a string")),
    };

    let content = match object.get("content") {
        Some(Value::String(text)) => MessageContent::Text(text.clone()),
        Some(Value::Array(blocks)) => MessageContent::Blocks(blocks.clone()),
        _ => return Err(invalid("content must be string or array")),
    };

    Ok(Message { role, content })
}

fn missing_messages() -> ProviderError {
    ProviderError::InvalidRequest("Invalid request: messages array is required".to_string())
}

/// Check a typed message list. Typed messages already carry a role and a
/// well-shaped content, so only emptiness remains to be checked.
pub fn validate_messages(messages: &[Message]) -> Result<(), ProviderError> {
    if messages.is_empty() {
        return Err(missing_messages());
    }
    Ok(())
}

/// True if any message carries block (array) content.
pub fn has_multimodal(messages: &[Message]) -> bool {
    messages.iter().any(Message::is_multimodal)
}

/// Flatten messages into one prompt string.
///
/// Each message becomes `"<Label>: <content>"`, joined by a blank line.
/// The system prompt, when present, is prepended followed by a blank line.
pub fn build_prompt(messages: &[Message], system: Option<&str>) -> String {
    let conversation = messages
        .iter()
        .map(|msg| format!("{}: {}", msg.role.label(), content_text(&msg.content)))
        .collect::<Vec<_>>()
        .join("\n\n");

    match system {
        Some(system) if !system.is_empty() => format!("{system}\n\n{conversation}"),
        _ => conversation,
    }
}

fn content_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => extract_text_blocks(blocks),
    }
}

/// Concatenate the `text` of every `{"type": "text"}` block.
pub fn extract_text_blocks(blocks: &[Value]) -> String {
    blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect()
}
