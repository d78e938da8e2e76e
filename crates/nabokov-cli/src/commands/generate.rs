//! Button card generation against an in-memory store.

use nabokov_provider::GenerationService;
use nabokov_session::features::card_generation::{generate_from_button, CardButton};
use nabokov_session::{
    Card, CardType, GenerationSession, MemoryStore, SessionConfig, SessionOutcome, Store,
    StoreEvent,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

pub struct GenerateOptions {
    pub template: String,
    pub title: String,
    pub content: String,
    pub label: String,
}

/// Run one button generation, printing every store write as a JSON line.
pub async fn run(service: Arc<GenerationService>, options: GenerateOptions) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let session = GenerationSession::new(service, store.clone())
        .with_config(SessionConfig::live(FLUSH_INTERVAL));

    let source = Card::new(CardType::Clipped)
        .with_title(options.title)
        .with_content(options.content);
    store.put(source.clone()).await?;

    let button = CardButton {
        id: options.label.to_lowercase().replace(' ', "-"),
        label: options.label,
        prompt: options.template,
        icon: None,
    };

    let mut events = store.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::Updated(card)) => println!("{}", json!({ "type": "updated", "card": card })),
                Ok(StoreEvent::Deleted(id)) => println!("{}", json!({ "type": "deleted", "id": id })),
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "store updates dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let running = generate_from_button(&session, &source, &button, None).await?;
    tracing::info!(card = %running.card_id(), "generation started");
    let result = running.wait().await;

    // Dropping every sender closes the channel and ends the printer.
    drop(session);
    drop(store);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "update printer failed");
    }

    match result? {
        SessionOutcome::Committed(card) => {
            tracing::info!(card = %card.id, "generation committed");
        }
        SessionOutcome::Cancelled(card) => {
            tracing::warn!(card = %card.id, "generation cancelled");
        }
    }
    Ok(())
}
