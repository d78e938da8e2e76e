//! Fill a card from the cards connected to it.

use crate::card::{Card, FillInHistoryEntry, FillInStrategy};
use crate::error::SessionError;
use crate::html::html_to_text;
use crate::session::{
    CancelBehavior, ContentStrategy, GenerationSession, RunningSession, SessionConfig,
};
use nabokov_provider::{now_millis, GenerationOptions, Message, ProviderError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const BASE_INSTRUCTIONS: &str = "You are an expert knowledge synthesizer. Your task is to create coherent, well-structured content by integrating information from multiple connected notes.";

const GUIDELINES: &str = "Guidelines:
- Be concise but comprehensive
- Maintain a clear, logical structure
- Integrate information naturally (don't just list sources)
- Preserve important details and nuances
- Use markdown formatting for readability
- If sources conflict, note the different perspectives";

/// A directed link between two cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source: String,
    pub target: String,
}

/// Which links count as connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Links pointing at the card.
    Incoming,
    /// Links leaving the card.
    Outgoing,
    #[default]
    Both,
}

/// Options for one fill-in.
#[derive(Debug, Clone, PartialEq)]
pub struct FillInRequest {
    pub strategy: FillInStrategy,
    /// Extra guidance from the user, if any.
    pub guidance: Option<String>,
}

impl FillInStrategy {
    fn instructions(&self) -> &'static str {
        match self {
            FillInStrategy::Replace => "Generate completely new content that synthesizes all the connected cards. Create a comprehensive, cohesive explanation that integrates insights from all sources.",
            FillInStrategy::Append => "Generate new content to ADD to the existing note. Build upon what's already there, adding new perspectives and information from the connected cards. Your output will be appended to the existing content.",
            FillInStrategy::Merge => "Generate content that intelligently MERGES with the existing note. Preserve the key insights from the original while weaving in new information from the connected cards. Aim for seamless integration.",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FillInStrategy::Replace => "Replace content with synthesis",
            FillInStrategy::Append => "Add synthesis to existing content",
            FillInStrategy::Merge => "Merge synthesis with existing content",
        }
    }
}

/// Cards linked to `card_id` that have content, in `all` order.
pub fn connected_cards<'a>(
    card_id: &str,
    all: &'a [Card],
    connections: &[Connection],
    direction: Direction,
) -> Vec<&'a Card> {
    let mut ids = HashSet::new();
    for conn in connections {
        if matches!(direction, Direction::Incoming | Direction::Both) && conn.target == card_id {
            ids.insert(conn.source.as_str());
        }
        if matches!(direction, Direction::Outgoing | Direction::Both) && conn.source == card_id {
            ids.insert(conn.target.as_str());
        }
    }
    all.iter()
        .filter(|card| ids.contains(card.id.as_str()) && !card.content.trim().is_empty())
        .collect()
}

fn tags_or_none(tags: &[String]) -> String {
    if tags.is_empty() {
        "none".to_string()
    } else {
        tags.join(", ")
    }
}

fn title_or_untitled(card: &Card) -> &str {
    if card.title().is_empty() {
        "Untitled"
    } else {
        card.title()
    }
}

/// Prompt section describing the source cards. Empty when there are none.
pub fn build_fill_in_context(sources: &[&Card]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, card)| {
            format!(
                "[Connected Card {}: \"{}\"]\nType: {}\nSource: {}\nTags: {}\n\n{}\n\n---",
                i + 1,
                title_or_untitled(card),
                card.card_type.as_str(),
                card.metadata.url,
                tags_or_none(&card.tags),
                html_to_text(&card.content).trim(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn system_prompt(strategy: FillInStrategy) -> String {
    format!(
        "{BASE_INSTRUCTIONS}\n\n{}\n\n{GUIDELINES}",
        strategy.instructions()
    )
}

pub fn user_prompt(target: &Card, context: &str, guidance: Option<&str>) -> String {
    let existing = if target.content.is_empty() {
        "[Empty - needs filling]"
    } else {
        &target.content
    };
    let mut prompt = format!(
        "# Target Card\nTitle: \"{}\"\nTags: {}\n\nCurrent Content:\n{}\n\n---\n\n# Connected Cards (Sources)\n\n{}\n\n---\n\n# Task\nSynthesize the information from the connected cards above",
        title_or_untitled(target),
        tags_or_none(&target.tags),
        existing,
        context,
    );
    if let Some(guidance) = guidance.map(str::trim).filter(|g| !g.is_empty()) {
        prompt.push_str(&format!(" with the following guidance: \"{guidance}\""));
    }
    prompt.push_str("\n\nGenerate well-structured content in markdown format.");
    prompt
}

/// One-line description of what a fill-in will do.
pub fn preview_fill_in(source_count: usize, strategy: FillInStrategy) -> String {
    format!(
        "Will {} using {} connected card{}.",
        strategy.label(),
        source_count,
        if source_count == 1 { "" } else { "s" }
    )
}

/// Combine generated text with what the card already holds.
pub fn apply_strategy(strategy: FillInStrategy, existing: &str, generated: &str) -> String {
    match strategy {
        FillInStrategy::Append if !existing.trim().is_empty() => {
            format!("{existing}\n\n{generated}")
        }
        _ => generated.to_string(),
    }
}

struct FillInResult {
    strategy: FillInStrategy,
    guidance: Option<String>,
    source_card_ids: Vec<String>,
    previous_content: String,
}

impl ContentStrategy for FillInResult {
    fn preview(&self, _card: &Card, partial: &str) -> String {
        apply_strategy(self.strategy, &self.previous_content, partial)
    }

    fn finalize(self: Box<Self>, card: &mut Card, text: &str) {
        card.content = apply_strategy(self.strategy, &self.previous_content, text);
        card.fill_in_history.push(FillInHistoryEntry {
            timestamp: now_millis(),
            source_card_ids: self.source_card_ids,
            strategy: self.strategy,
            user_prompt: self.guidance,
            previous_content: Some(self.previous_content),
        });
    }

    /// The note is left as it was; only the error detail is recorded.
    fn fail(self: Box<Self>, card: &mut Card, _err: &ProviderError) {
        card.content = self.previous_content;
    }
}

/// Start filling `target` from `sources`.
///
/// The target keeps its current content while generating, on failure, and
/// on cancellation. Fails before anything is written when no source has
/// content.
pub async fn fill_in(
    session: &GenerationSession,
    target: Card,
    sources: &[&Card],
    request: FillInRequest,
) -> Result<RunningSession, SessionError> {
    let sources: Vec<&Card> = sources
        .iter()
        .copied()
        .filter(|card| !card.content.trim().is_empty())
        .collect();
    let context = build_fill_in_context(&sources);
    if context.is_empty() {
        return Err(SessionError::Precondition(
            "No connected cards with content found".to_string(),
        ));
    }

    let FillInRequest { strategy, guidance } = request;
    let prompt = user_prompt(&target, &context, guidance.as_deref());
    let options = GenerationOptions::default().with_system(system_prompt(strategy));
    let source_card_ids: Vec<String> = sources.iter().map(|card| card.id.clone()).collect();
    let previous_content = target.content.clone();
    tracing::debug!(card = %target.id, sources = source_card_ids.len(), ?strategy, "fill-in");

    let result = FillInResult {
        strategy,
        guidance,
        source_card_ids,
        previous_content,
    };

    let keep_content = session.clone().with_config(SessionConfig {
        placeholder: None,
        on_cancel: CancelBehavior::Restore,
        ..session.config().clone()
    });
    keep_content
        .begin(target, vec![Message::user(prompt)], options, Box::new(result))
        .await
}
