//! Persistence collaborator for cards.

use crate::card::Card;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

const EVENT_CAPACITY: usize = 256;

/// Change notification broadcast after every write.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The card was written; carries the stored snapshot.
    Updated(Card),
    /// The card was removed.
    Deleted(String),
}

impl StoreEvent {
    pub fn card_id(&self) -> &str {
        match self {
            StoreEvent::Updated(card) => &card.id,
            StoreEvent::Deleted(id) => id,
        }
    }
}

/// Key-value card store with change broadcast. Last write wins.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Card>, StoreError>;

    /// Insert or replace a card, then broadcast `Updated`.
    async fn put(&self, card: Card) -> Result<(), StoreError>;

    /// Remove a card, then broadcast `Deleted`.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<Card>, StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// In-memory store.
pub struct MemoryStore {
    cards: RwLock<HashMap<String, Card>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cards: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Card>, StoreError> {
        Ok(self.cards.read().await.get(id).cloned())
    }

    async fn put(&self, card: Card) -> Result<(), StoreError> {
        self.cards
            .write()
            .await
            .insert(card.id.clone(), card.clone());
        tracing::trace!(card = %card.id, generating = card.is_generating, "card stored");
        self.notify(StoreEvent::Updated(card));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if self.cards.write().await.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.notify(StoreEvent::Deleted(id.to_string()));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Card>, StoreError> {
        let mut cards: Vec<Card> = self.cards.read().await.values().cloned().collect();
        cards.sort_by_key(|card| card.created_at);
        Ok(cards)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardType;

    #[tokio::test]
    async fn test_put_get_and_broadcast() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();
        let card = Card::new(CardType::Note).with_title("a");

        store.put(card.clone()).await.unwrap();
        assert_eq!(store.get(&card.id).await.unwrap(), Some(card.clone()));
        assert_eq!(events.recv().await.unwrap(), StoreEvent::Updated(card.clone()));

        store.delete(&card.id).await.unwrap();
        assert_eq!(store.get(&card.id).await.unwrap(), None);
        assert_eq!(events.recv().await.unwrap().card_id(), card.id);
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.delete("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        let card = Card::new(CardType::Note);
        store.put(card.clone().with_content("one")).await.unwrap();
        store.put(card.clone().with_content("two")).await.unwrap();
        assert_eq!(store.get(&card.id).await.unwrap().unwrap().content, "two");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
