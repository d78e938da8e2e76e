//! Button-triggered card generation.
//!
//! A button carries a prompt template. The template is filled from the
//! source card and the result becomes a new card placed to the right of it.

use crate::card::{Card, CardMetadata, CardType, ConversationEntry, GenerationContext, Position, Size};
use crate::error::SessionError;
use crate::html::{format_as_html, html_to_text};
use crate::session::{finalize_with, GenerationSession, RunningSession};
use nabokov_provider::{now_millis, GenerationOptions, Message, Role};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_SOURCE_WIDTH: f64 = 320.0;
const HORIZONTAL_GAP: f64 = 60.0;
const GENERATED_SIZE: Size = Size {
    width: 400.0,
    height: 300.0,
};

static DEFAULTED_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{(\w+)\s*\|\|\s*["']([^"']*)["']\}\}"#).expect("valid regex")
});
static SIMPLE_VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid regex"));

/// A card action button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardButton {
    pub id: String,
    pub label: String,
    /// Template with `{{var}}` and `{{var || 'default'}}` placeholders.
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Fill a prompt template.
///
/// `{{var || 'default'}}` uses the default when `var` is missing or empty.
/// `{{var}}` is replaced only for known variables.
pub fn render_template(template: &str, vars: &HashMap<&str, String>) -> String {
    let with_defaults = DEFAULTED_VAR.replace_all(template, |caps: &Captures| {
        match vars.get(&caps[1]) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => caps[2].to_string(),
        }
    });
    SIMPLE_VAR
        .replace_all(&with_defaults, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Prompt for a button applied to a source card.
pub fn button_prompt(source: &Card, button: &CardButton, custom_context: Option<&str>) -> String {
    let vars = HashMap::from([
        ("content", html_to_text(&source.content)),
        ("title", source.title().to_string()),
        ("customContext", custom_context.unwrap_or_default().to_string()),
    ]);
    render_template(&button.prompt, &vars)
}

/// Position for a card generated from `source`.
pub fn position_beside(source: &Card) -> Position {
    let base = source.position.unwrap_or_default();
    let width = source
        .size
        .map(|size| size.width)
        .unwrap_or(DEFAULT_SOURCE_WIDTH);
    Position {
        x: base.x + width + HORIZONTAL_GAP,
        y: base.y,
    }
}

/// Skeleton for a generated card, with all structural fields final.
pub fn generated_card_skeleton(source: &Card, button: &CardButton) -> Card {
    let mut card = Card::new(CardType::Generated);
    card.parent_card_id = Some(source.id.clone());
    card.metadata = CardMetadata {
        title: format!("{}: {}", button.label, source.title()),
        domain: "ai-generated".to_string(),
        url: String::new(),
        favicon: button.icon.clone(),
    };
    card.position = Some(position_beside(source));
    card.size = Some(GENERATED_SIZE);
    card.tags = vec!["ai-generated".to_string(), button.label.to_lowercase()];
    card
}

/// Start generating a new card from a button.
pub async fn generate_from_button(
    session: &GenerationSession,
    source: &Card,
    button: &CardButton,
    custom_context: Option<&str>,
) -> Result<RunningSession, SessionError> {
    let prompt = button_prompt(source, button, custom_context);
    let skeleton = generated_card_skeleton(source, button);
    tracing::debug!(source = %source.id, button = %button.id, card = %skeleton.id, "generating card from button");

    let messages = vec![Message::user(prompt.clone())];
    let strategy = finalize_with(move |card: &mut Card, text: &str| {
        let question = ConversationEntry::new(Role::User, prompt.clone());
        let answer = ConversationEntry::new(Role::Assistant, text);
        card.generation_context = Some(GenerationContext {
            source_message_id: question.id.clone(),
            user_prompt: prompt,
            timestamp: now_millis(),
        });
        card.conversation = vec![question, answer];
        card.content = format_as_html(text);
    });

    session
        .begin(skeleton, messages, GenerationOptions::default(), strategy)
        .await
}
