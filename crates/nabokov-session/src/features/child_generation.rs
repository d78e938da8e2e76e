//! Child cards generated from a text selection inside a parent card.

use crate::card::{Card, CardMetadata, CardType, ConversationEntry, GenerationContext, Size};
use crate::error::SessionError;
use crate::features::card_generation::position_beside;
use crate::session::{finalize_with, GenerationSession, RunningSession};
use nabokov_provider::{now_millis, GenerationOptions, Message, Role};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const FALLBACK_TITLE: &str = "Generated Content";
const TITLE_TEXT_LIMIT: usize = 50;
const CHILD_SIZE: Size = Size {
    width: 400.0,
    height: 300.0,
};

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid regex"));
static BARE_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// What kind of content to generate for the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationType {
    #[default]
    Explanation,
    Definition,
    DeepDive,
    Examples,
}

impl GenerationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationType::Explanation => "explanation",
            GenerationType::Definition => "definition",
            GenerationType::DeepDive => "deep-dive",
            GenerationType::Examples => "examples",
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            GenerationType::Explanation => "Provide a general overview and explanation",
            GenerationType::Definition => "Give a precise, technical definition",
            GenerationType::DeepDive => "Provide a comprehensive analysis with examples",
            GenerationType::Examples => "Give practical use cases and applications",
        }
    }

    fn title_prefix(&self) -> &'static str {
        match self {
            GenerationType::Explanation => "Explaining",
            GenerationType::Definition => "Definition of",
            GenerationType::DeepDive => "Deep Dive into",
            GenerationType::Examples => "Examples of",
        }
    }
}

/// Selected text with a little surrounding context.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSelection {
    pub text: String,
    #[serde(default)]
    pub context_before: String,
    #[serde(default)]
    pub context_after: String,
}

/// Structured model output.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildContent {
    pub title: String,
    /// HTML
    pub content: String,
    pub tags: Vec<String>,
}

pub fn build_prompt(parent: &Card, selection: &TextSelection, kind: GenerationType) -> String {
    let tags = if parent.tags.is_empty() {
        "none".to_string()
    } else {
        parent.tags.join(", ")
    };
    format!(
        r#"{instruction} of "{text}".

Context from parent card:
- Title: {title}
- Domain: {domain}
- URL: {url}
- Tags: {tags}

Surrounding context:
...{before} [{text}] {after}...

Please respond with a JSON object in this exact format:
{{
  "title": "Brief title for the concept",
  "content": "Detailed explanation in HTML format with proper paragraphs and formatting",
  "tags": ["tag1", "tag2", "tag3"]
}}

Make the content informative and well-structured with proper HTML tags (p, h3, ul, li, strong, etc.)."#,
        instruction = kind.instruction(),
        text = selection.text,
        title = parent.title(),
        domain = parent.metadata.domain,
        url = parent.metadata.url,
        before = selection.context_before,
        after = selection.context_after,
    )
}

#[derive(Deserialize)]
struct RawChild {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tags: Option<serde_json::Value>,
}

/// Parse the model reply. Accepts a fenced ```json block or a bare object;
/// anything else becomes a single paragraph.
pub fn parse_response(text: &str) -> ChildContent {
    let candidate = FENCED_JSON
        .captures(text)
        .and_then(|caps| caps.get(1))
        .or_else(|| BARE_OBJECT.find(text))
        .map(|m| m.as_str());

    let parsed = candidate.and_then(|json| match serde_json::from_str::<RawChild>(json) {
        Ok(raw) => Some(raw),
        Err(e) => {
            tracing::debug!(error = %e, "child generation reply is not valid JSON");
            None
        }
    });

    match parsed {
        Some(raw) => ChildContent {
            title: raw
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| FALLBACK_TITLE.to_string()),
            content: raw
                .content
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| text.to_string()),
            tags: match raw.tags {
                Some(serde_json::Value::Array(items)) => items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            },
        },
        None => ChildContent {
            title: FALLBACK_TITLE.to_string(),
            content: format!("<p>{text}</p>"),
            tags: Vec::new(),
        },
    }
}

/// Card title for a selection, e.g. `Definition of: borrow checker`.
pub fn suggested_title(selected: &str, kind: GenerationType) -> String {
    let truncated = if selected.chars().count() > TITLE_TEXT_LIMIT {
        let head: String = selected.chars().take(TITLE_TEXT_LIMIT).collect();
        format!("{head}...")
    } else {
        selected.to_string()
    };
    format!("{}: {}", kind.title_prefix(), truncated)
}

pub fn child_card_skeleton(parent: &Card, selection: &TextSelection, kind: GenerationType) -> Card {
    let mut card = Card::new(CardType::Generated);
    card.parent_card_id = Some(parent.id.clone());
    card.metadata = CardMetadata {
        title: suggested_title(&selection.text, kind),
        domain: parent.metadata.domain.clone(),
        url: parent.metadata.url.clone(),
        favicon: parent.metadata.favicon.clone(),
    };
    card.position = Some(position_beside(parent));
    card.size = Some(CHILD_SIZE);
    card.tags = vec![kind.as_str().to_string(), "ai-generated".to_string()];
    card
}

/// Start generating a child card for `selection`.
///
/// The card keeps the suggested title; the model's title is not applied
/// because the title is fixed once the skeleton is written.
pub async fn generate_child(
    session: &GenerationSession,
    parent: &Card,
    selection: &TextSelection,
    kind: GenerationType,
) -> Result<RunningSession, SessionError> {
    if selection.text.trim().is_empty() {
        return Err(SessionError::Precondition(
            "Please select some text first".to_string(),
        ));
    }
    let prompt = build_prompt(parent, selection, kind);
    let skeleton = child_card_skeleton(parent, selection, kind);
    tracing::debug!(parent = %parent.id, card = %skeleton.id, kind = kind.as_str(), "generating child card");

    let messages = vec![Message::user(prompt.clone())];
    let strategy = finalize_with(move |card: &mut Card, text: &str| {
        let parsed = parse_response(text);
        for tag in parsed.tags {
            if !card.tags.contains(&tag) {
                card.tags.push(tag);
            }
        }
        let question = ConversationEntry::new(Role::User, prompt.clone());
        card.generation_context = Some(GenerationContext {
            source_message_id: question.id.clone(),
            user_prompt: prompt,
            timestamp: now_millis(),
        });
        card.conversation = vec![question, ConversationEntry::new(Role::Assistant, text)];
        card.content = parsed.content;
    });

    session
        .begin(skeleton, messages, GenerationOptions::default(), strategy)
        .await
}
