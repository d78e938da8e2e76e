//! The card entity mutated by generation sessions.

use nabokov_provider::{now_millis, Role};
use serde::{Deserialize, Serialize};

/// Kind of card on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    #[default]
    Clipped,
    Generated,
    Note,
    Chat,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Clipped => "clipped",
            CardType::Generated => "generated",
            CardType::Note => "note",
            CardType::Chat => "chat",
        }
    }
}

/// Source metadata of a card.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CardMetadata {
    pub title: String,
    pub domain: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// One turn of a card's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: u64,
}

impl ConversationEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            role,
            content: content.into(),
            timestamp: now_millis(),
        }
    }
}

/// Where a generated card's text came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    pub source_message_id: String,
    pub user_prompt: String,
    pub timestamp: u64,
}

/// How fill-in combines generated text with the existing note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillInStrategy {
    Replace,
    Append,
    Merge,
}

/// Record of a fill-in, kept for undo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillInHistoryEntry {
    pub timestamp: u64,
    pub source_card_ids: Vec<String>,
    pub strategy: FillInStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_content: Option<String>,
}

/// A card on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: CardMetadata,
    #[serde(default)]
    pub card_type: CardType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_card_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub is_generating: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation: Vec<ConversationEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_context: Option<GenerationContext>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fill_in_history: Vec<FillInHistoryEntry>,
    /// Raw cause of the last failed generation. Debug only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Card {
    /// New card with a fresh id.
    pub fn new(card_type: CardType) -> Self {
        let now = now_millis();
        Self {
            id: ulid::Ulid::new().to_string(),
            content: String::new(),
            metadata: CardMetadata::default(),
            card_type,
            parent_card_id: None,
            position: None,
            size: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            is_generating: false,
            conversation: Vec::new(),
            generation_context: None,
            fill_in_history: Vec::new(),
            error_detail: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = title.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn touch(&mut self) {
        self.updated_at = now_millis().max(self.updated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_cards_have_distinct_ids() {
        let a = Card::new(CardType::Note);
        let b = Card::new(CardType::Note);
        assert_ne!(a.id, b.id);
        assert!(!a.is_generating);
    }

    #[test]
    fn test_card_wire_format() {
        let mut card = Card::new(CardType::Generated).with_title("T");
        card.parent_card_id = Some("p".into());
        card.is_generating = true;
        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(value["cardType"], "generated");
        assert_eq!(value["parentCardId"], "p");
        assert_eq!(value["isGenerating"], true);
        assert_eq!(value["metadata"]["title"], "T");
        assert!(value.get("conversation").is_none());
    }

    #[test]
    fn test_card_deserialize_with_defaults() {
        let card: Card = serde_json::from_value(json!({
            "id": "c1",
            "createdAt": 1,
            "updatedAt": 2
        }))
        .unwrap();
        assert_eq!(card.card_type, CardType::Clipped);
        assert!(card.tags.is_empty());
        assert_eq!(card.content, "");
    }
}
