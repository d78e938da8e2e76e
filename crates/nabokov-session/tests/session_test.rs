//! Generation lifecycle tests against the in-memory store and offline provider.

use nabokov_provider::providers::mock::{MockProvider, ScriptEnd};
use nabokov_provider::{GenerationOptions, GenerationService, Message, ProviderError, ProviderRegistry, ProviderSelection};
use nabokov_session::features::card_generation::{generate_from_button, CardButton};
use nabokov_session::features::chat::{ask, chat_card_for, CHAT_SYSTEM_PROMPT};
use nabokov_session::features::child_generation::{generate_child, GenerationType, TextSelection};
use nabokov_session::features::fill_in::{fill_in, FillInRequest};
use nabokov_session::{
    CancelBehavior, Card, CardType, FillInStrategy, GenerationSession, MemoryStore, RawText,
    SessionConfig, SessionError, SessionOutcome, Store, StoreEvent, DEFAULT_PLACEHOLDER,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    session: GenerationSession,
    store: Arc<MemoryStore>,
    provider: Arc<MockProvider>,
}

fn harness(provider: MockProvider) -> Harness {
    let provider = Arc::new(provider);
    let mut registry = ProviderRegistry::new();
    registry.register("mock", provider.clone());
    let selection = ProviderSelection {
        explicit: Some("mock".into()),
        ..Default::default()
    };
    let service = Arc::new(GenerationService::new(registry, &selection).unwrap());
    let store = Arc::new(MemoryStore::new());
    let session = GenerationSession::new(service, store.clone());
    Harness {
        session,
        store,
        provider,
    }
}

fn drain(rx: &mut broadcast::Receiver<StoreEvent>) -> Vec<StoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn updated(events: &[StoreEvent]) -> Vec<Card> {
    events
        .iter()
        .filter_map(|event| match event {
            StoreEvent::Updated(card) => Some(card.clone()),
            StoreEvent::Deleted(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn test_commit_writes_skeleton_then_final() {
    let h = harness(MockProvider::scripted(["Hello", " world"], ScriptEnd::Done(None)));
    let mut rx = h.store.subscribe();
    let skeleton = Card::new(CardType::Note).with_title("T");
    let id = skeleton.id.clone();

    let running = h
        .session
        .begin(
            skeleton,
            vec![Message::user("hi")],
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap();
    assert_eq!(running.card_id(), id);
    let outcome = running.wait().await.unwrap();

    let writes = updated(&drain(&mut rx));
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|card| card.id == id));
    assert!(writes[0].is_generating);
    assert_eq!(writes[0].content, DEFAULT_PLACEHOLDER);
    assert!(!writes[1].is_generating);
    assert_eq!(writes[1].content, "Hello world");
    assert_eq!(writes[1].title(), "T");
    assert_eq!(outcome, SessionOutcome::Committed(writes[1].clone()));
}

#[tokio::test]
async fn test_final_text_overrides_accumulated_tokens() {
    let h = harness(MockProvider::scripted(
        ["partial"],
        ScriptEnd::Done(Some("authoritative".into())),
    ));
    let outcome = h
        .session
        .run(
            Card::new(CardType::Note),
            vec![Message::user("hi")],
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap();
    assert_eq!(outcome.card().content, "authoritative");
}

#[tokio::test]
async fn test_failure_marks_card_and_reports_cause() {
    let h = harness(MockProvider::scripted(["half"], ScriptEnd::Error("boom".into())));
    let mut rx = h.store.subscribe();
    let skeleton = Card::new(CardType::Note);
    let id = skeleton.id.clone();

    let err = h
        .session
        .run(
            skeleton,
            vec![Message::user("hi")],
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Failed to generate: boom");
    match &err {
        SessionError::Generation { card_id, source } => {
            assert_eq!(card_id, &id);
            assert!(matches!(source, ProviderError::Transport(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let writes = updated(&drain(&mut rx));
    assert_eq!(writes.len(), 2);
    let failed = &writes[1];
    assert!(!failed.is_generating);
    assert_eq!(
        failed.content,
        "Generation failed: The provider reported an error: boom"
    );
    assert_eq!(failed.error_detail.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_truncated_stream_fails_card() {
    let h = harness(MockProvider::scripted(["a"], ScriptEnd::Truncate));
    let err = h
        .session
        .run(
            Card::new(CardType::Note),
            vec![Message::user("hi")],
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.provider_error(),
        Some(ProviderError::IncompleteStream(_))
    ));
}

#[tokio::test]
async fn test_validation_error_writes_nothing() {
    let h = harness(MockProvider::echo());
    let mut rx = h.store.subscribe();
    let err = h
        .session
        .begin(
            Card::new(CardType::Note),
            Vec::new(),
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert!(drain(&mut rx).is_empty());
    assert!(h.store.list().await.unwrap().is_empty());
    assert!(h.provider.requests().is_empty());
}

#[tokio::test]
async fn test_cancel_keeps_skeleton() {
    let h = harness(MockProvider::scripted(["a"], ScriptEnd::Hang));
    let skeleton = Card::new(CardType::Note);
    let id = skeleton.id.clone();
    let running = h
        .session
        .begin(
            skeleton,
            vec![Message::user("hi")],
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap();
    let handle = running.cancel_handle();
    handle.cancel();
    assert!(handle.is_cancelled());

    let outcome = tokio::time::timeout(Duration::from_secs(5), running.wait())
        .await
        .expect("cancelled session finishes")
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::Cancelled(_)));
    let stored = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.content, DEFAULT_PLACEHOLDER);
}

#[tokio::test]
async fn test_cancel_can_delete_skeleton() {
    let h = harness(MockProvider::scripted(Vec::<String>::new(), ScriptEnd::Hang));
    let session = h.session.clone().with_config(SessionConfig {
        on_cancel: CancelBehavior::DeleteSkeleton,
        ..Default::default()
    });
    let running = session
        .begin(
            Card::new(CardType::Note),
            vec![Message::user("hi")],
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap();
    running.cancel();
    let outcome = running.wait().await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Cancelled(_)));
    assert!(h.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_live_mode_flushes_partial_content() {
    let h = harness(MockProvider::scripted(["a", "b", "c"], ScriptEnd::Done(None)));
    let session = h.session.clone().with_config(SessionConfig::live(Duration::ZERO));
    let mut rx = h.store.subscribe();
    session
        .run(
            Card::new(CardType::Note),
            vec![Message::user("hi")],
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap();

    let contents: Vec<String> = updated(&drain(&mut rx))
        .into_iter()
        .map(|card| card.content)
        .collect();
    assert_eq!(contents, vec![DEFAULT_PLACEHOLDER, "a", "ab", "abc", "abc"]);
}

#[tokio::test]
async fn test_concurrent_sessions_use_distinct_cards() {
    let h = harness(MockProvider::echo());
    let first = h
        .session
        .begin(
            Card::new(CardType::Note),
            vec![Message::user("one")],
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap();
    let second = h
        .session
        .begin(
            Card::new(CardType::Note),
            vec![Message::user("two")],
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap();
    assert_ne!(first.card_id(), second.card_id());
    assert_eq!(first.wait().await.unwrap().card().content, "one");
    assert_eq!(second.wait().await.unwrap().card().content, "two");
}

#[tokio::test]
async fn test_button_generation_creates_linked_card() {
    let h = harness(MockProvider::scripted(
        ["Point one\n\nPoint two"],
        ScriptEnd::Done(None),
    ));
    let source = Card::new(CardType::Clipped)
        .with_title("Article")
        .with_content("<p>Long text</p>");
    let button = CardButton {
        id: "summarize".into(),
        label: "Summarize".into(),
        prompt: "Summarize {{title}}: {{content}}".into(),
        icon: Some("S".into()),
    };

    let running = generate_from_button(&h.session, &source, &button, None)
        .await
        .unwrap();
    let card = running.wait().await.unwrap().card().clone();

    assert_eq!(card.card_type, CardType::Generated);
    assert_eq!(card.parent_card_id.as_deref(), Some(source.id.as_str()));
    assert_eq!(card.title(), "Summarize: Article");
    assert_eq!(card.content, "<p>Point one</p><p>Point two</p>");
    assert_eq!(card.conversation.len(), 2);
    assert_eq!(
        card.generation_context.as_ref().unwrap().user_prompt,
        "Summarize Article: Long text"
    );
    assert_eq!(h.provider.requests()[0].prompt, "User: Summarize Article: Long text");
}

#[tokio::test]
async fn test_chat_appends_conversation() {
    let h = harness(MockProvider::scripted(["It is ", "fast."], ScriptEnd::Done(None)));
    let source = Card::new(CardType::Clipped).with_content("<p>Rust</p>");
    let chat = chat_card_for(&source);
    let id = chat.id.clone();

    let card = ask(&h.session, &source, chat, "Is it fast?")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap()
        .card()
        .clone();

    assert_eq!(card.id, id);
    assert_eq!(card.conversation.len(), 2);
    assert_eq!(card.conversation[0].content, "Is it fast?");
    assert_eq!(card.conversation[1].content, "It is fast.");
    assert!(card.content.contains("<strong>Assistant:</strong> It is fast."));
    let prompt = &h.provider.requests()[0].prompt;
    assert!(prompt.starts_with(CHAT_SYSTEM_PROMPT));
    assert!(prompt.ends_with("User: Context: Rust\n\nUser: Is it fast?"));
}

#[tokio::test]
async fn test_child_generation_parses_reply() {
    let reply = r#"{"title": "Ignored", "content": "<p>Lifetimes</p>", "tags": ["rust"]}"#;
    let h = harness(MockProvider::scripted([reply], ScriptEnd::Done(None)));
    let parent = Card::new(CardType::Clipped).with_title("Book");
    let selection = TextSelection {
        text: "lifetimes".into(),
        ..Default::default()
    };

    let card = generate_child(&h.session, &parent, &selection, GenerationType::Definition)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap()
        .card()
        .clone();

    assert_eq!(card.title(), "Definition of: lifetimes");
    assert_eq!(card.content, "<p>Lifetimes</p>");
    assert_eq!(card.tags, vec!["definition", "ai-generated", "rust"]);
    assert_eq!(card.parent_card_id.as_deref(), Some(parent.id.as_str()));
}

#[tokio::test]
async fn test_fill_in_appends_and_records_history() {
    let h = harness(MockProvider::scripted(["New insight"], ScriptEnd::Done(None)));
    let mut rx = h.store.subscribe();
    let target = Card::new(CardType::Note)
        .with_title("Notes")
        .with_content("Old notes");
    let source = Card::new(CardType::Clipped)
        .with_title("Source")
        .with_content("<p>Facts</p>");

    let card = fill_in(
        &h.session,
        target,
        &[&source],
        FillInRequest {
            strategy: FillInStrategy::Append,
            guidance: Some("short".into()),
        },
    )
    .await
    .unwrap()
    .wait()
    .await
    .unwrap()
    .card()
    .clone();

    let writes = updated(&drain(&mut rx));
    assert_eq!(writes[0].content, "Old notes");
    assert!(writes[0].is_generating);
    assert_eq!(card.content, "Old notes\n\nNew insight");
    let history = &card.fill_in_history[0];
    assert_eq!(history.source_card_ids, vec![source.id.clone()]);
    assert_eq!(history.previous_content.as_deref(), Some("Old notes"));
    assert_eq!(history.user_prompt.as_deref(), Some("short"));
    assert!(h.provider.requests()[0].prompt.contains("Facts"));
}

#[tokio::test]
async fn test_fill_in_without_sources_fails_early() {
    let h = harness(MockProvider::echo());
    let empty = Card::new(CardType::Note).with_content("  ");
    let err = fill_in(
        &h.session,
        Card::new(CardType::Note),
        &[&empty],
        FillInRequest {
            strategy: FillInStrategy::Replace,
            guidance: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "No connected cards with content found");
    assert!(h.store.list().await.unwrap().is_empty());
}

async fn next_update_matching(
    rx: &mut broadcast::Receiver<StoreEvent>,
    pred: impl Fn(&Card) -> bool,
) -> Card {
    let wait = async {
        loop {
            if let Ok(StoreEvent::Updated(card)) = rx.recv().await {
                if pred(&card) {
                    return card;
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("matching store update")
}

#[tokio::test]
async fn test_live_mode_flushes_after_stream_stalls() {
    let h = harness(MockProvider::scripted(["a", "b"], ScriptEnd::Hang));
    let session = h
        .session
        .clone()
        .with_config(SessionConfig::live(Duration::from_millis(50)));
    let mut rx = h.store.subscribe();
    let running = session
        .begin(
            Card::new(CardType::Note),
            vec![Message::user("hi")],
            GenerationOptions::default(),
            Box::new(RawText),
        )
        .await
        .unwrap();

    let partial = next_update_matching(&mut rx, |card| card.content == "ab").await;
    assert!(partial.is_generating);
    assert_eq!(partial.id, running.card_id());

    running.cancel();
    running.wait().await.unwrap();
}

#[tokio::test]
async fn test_chat_reply_streams_on_buffered_session() {
    let h = harness(MockProvider::scripted(["It is "], ScriptEnd::Hang));
    let mut rx = h.store.subscribe();
    let source = Card::new(CardType::Clipped).with_content("<p>Rust</p>");
    let chat = chat_card_for(&source);

    let running = ask(&h.session, &source, chat, "Is it fast?").await.unwrap();
    let partial = next_update_matching(&mut rx, |card| {
        card.content.contains("<strong>Assistant:</strong> It is ")
    })
    .await;
    assert!(partial.is_generating);
    assert!(partial.content.contains("<strong>User:</strong> Is it fast?"));

    running.cancel();
    running.wait().await.unwrap();
}

#[tokio::test]
async fn test_fill_in_failure_keeps_note() {
    let h = harness(MockProvider::scripted(
        Vec::<String>::new(),
        ScriptEnd::Error("rate limited".into()),
    ));
    let target = Card::new(CardType::Note).with_content("My hand-written notes");
    let id = target.id.clone();
    let source = Card::new(CardType::Clipped).with_content("<p>Facts</p>");

    let err = fill_in(
        &h.session,
        target,
        &[&source],
        FillInRequest {
            strategy: FillInStrategy::Append,
            guidance: None,
        },
    )
    .await
    .unwrap()
    .wait()
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Failed to generate: rate limited");

    let stored = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.content, "My hand-written notes");
    assert!(!stored.is_generating);
    assert_eq!(stored.error_detail.as_deref(), Some("rate limited"));
    assert!(stored.fill_in_history.is_empty());
}

#[tokio::test]
async fn test_fill_in_cancel_restores_note() {
    let h = harness(MockProvider::scripted(["partial"], ScriptEnd::Hang));
    let session = h.session.clone().with_config(SessionConfig {
        on_cancel: CancelBehavior::DeleteSkeleton,
        ..SessionConfig::live(Duration::ZERO)
    });
    let mut rx = h.store.subscribe();
    let target = Card::new(CardType::Note).with_content("Keep me");
    let id = target.id.clone();
    let source = Card::new(CardType::Clipped).with_content("<p>Facts</p>");

    let running = fill_in(
        &session,
        target,
        &[&source],
        FillInRequest {
            strategy: FillInStrategy::Replace,
            guidance: None,
        },
    )
    .await
    .unwrap();
    next_update_matching(&mut rx, |card| card.content == "partial").await;
    running.cancel();
    let outcome = running.wait().await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Cancelled(_)));

    let stored = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.content, "Keep me");
    assert!(!stored.is_generating);
}
