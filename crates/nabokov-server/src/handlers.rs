//! Route handlers.

use crate::error::ApiError;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::{Stream, StreamExt};
use nabokov_provider::prompt::parse_messages;
use nabokov_provider::{now_millis, GenerationOptions, Message, ProviderError, StreamEvent};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;

/// SSE payload that ends a successful stream.
pub const DONE_SENTINEL: &str = "[DONE]";

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": now_millis(),
        "message": "Nabokov backend server is running",
        "provider": state.service.provider_name(),
        "providerKey": state.service.provider_key(),
    }))
}

pub async fn message(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let (messages, options) = parse_body(&body)?;
    tracing::debug!(messages = messages.len(), "message request");
    let response = state.service.send_message(&messages, &options).await?;
    Ok(Json(response))
}

pub async fn stream(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (messages, options) = parse_body(&body)?;
    // Validation errors surface here, before any SSE header is written.
    let generation = state.service.stream_message(&messages, &options)?;
    tracing::debug!(
        provider = %generation.metadata().provider,
        model = %generation.metadata().resolved_model,
        "stream request"
    );

    let events = generation.map(|event| Ok(to_sse(event)));
    Ok(Sse::new(events))
}

fn to_sse(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Token { text } => {
            Event::default().data(json!({ "delta": { "text": text } }).to_string())
        }
        StreamEvent::Done { .. } => Event::default().data(DONE_SENTINEL),
        StreamEvent::Error(err) => {
            tracing::warn!(code = err.code(), error = %err, "stream ended with error");
            Event::default().data(json!({ "error": err.to_string() }).to_string())
        }
    }
}

/// Split a request body into messages and options.
fn parse_body(body: &[u8]) -> Result<(Vec<Message>, GenerationOptions), ApiError> {
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(body).map_err(|e| ApiError::MalformedBody(e.to_string()))?
    };

    let messages = parse_messages(value.get("messages").unwrap_or(&Value::Null))?;
    let options = match value.get("options") {
        None | Some(Value::Null) => GenerationOptions::default(),
        Some(options) => serde_json::from_value(options.clone()).map_err(|e| {
            ProviderError::InvalidRequest(format!("Invalid request: options {e}"))
        })?,
    };
    Ok((messages, options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body() {
        let (messages, options) = parse_body(
            br#"{"messages":[{"role":"user","content":"hi"}],"options":{"system":"s","providerKey":"mock"}}"#,
        )
        .unwrap();
        assert_eq!(messages, vec![Message::user("hi")]);
        assert_eq!(options.system.as_deref(), Some("s"));
        assert_eq!(options.provider_key.as_deref(), Some("mock"));
    }

    #[test]
    fn test_parse_body_errors() {
        let err = parse_body(b"").unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: messages array is required");
        assert!(matches!(
            parse_body(b"{not json").unwrap_err(),
            ApiError::MalformedBody(_)
        ));
        let err = parse_body(br#"{"messages":[{"content":"x"}]}"#).unwrap_err();
        assert_eq!(err.to_string(), "Invalid message at index 0: missing role");
    }
}
