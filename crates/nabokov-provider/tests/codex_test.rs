//! Codex provider tests against real child processes.
//!
//! `/bin/sh -c <script>` stands in for the CLI: the script sees the protocol
//! arguments as `$@` and the prompt on stdin.

#![cfg(unix)]

use futures::StreamExt;
use nabokov_provider::providers::codex::{CodexConfig, CodexProvider};
use nabokov_provider::{collect_text, Provider, ProviderError, ProviderRequest, StreamEvent};
use std::time::{Duration, Instant};

const DELTA_HELLO: &str = r#"{"type":"item.delta","delta":{"text":"Hello"}}"#;
const DELTA_WORLD: &str = r#"{"type":"item.delta","delta":{"text":" world"}}"#;
const TURN_COMPLETED: &str = r#"{"type":"turn.completed"}"#;

fn emit(line: &str) -> String {
    format!("echo '{line}'; ")
}

fn shell_config(script: &str) -> CodexConfig {
    CodexConfig {
        program: "/bin/sh".to_string(),
        program_args: vec!["-c".to_string(), script.to_string(), "codex".to_string()],
        ..Default::default()
    }
}

fn shell_provider(script: &str) -> CodexProvider {
    CodexProvider::new(shell_config(script))
}

async fn collect_events(provider: &CodexProvider, request: ProviderRequest) -> Vec<StreamEvent> {
    tokio::time::timeout(Duration::from_secs(10), provider.stream(request).collect())
        .await
        .expect("stream did not finish")
}

#[tokio::test]
async fn test_send_aggregates_deltas() {
    let script = format!("{}{}{}", emit(DELTA_HELLO), emit(DELTA_WORLD), emit(TURN_COMPLETED));
    let provider = shell_provider(&script);
    let text = provider.send(ProviderRequest::new("Say hello")).await.unwrap();
    assert_eq!(text, "Hello world");
}

#[tokio::test]
async fn test_stream_emits_tokens_then_single_done() {
    let script = format!(
        "{}{}{}{}",
        emit(DELTA_HELLO),
        emit(DELTA_WORLD),
        emit(TURN_COMPLETED),
        emit(r#"{"type":"item.delta","delta":{"text":"ignored"}}"#)
    );
    let events = collect_events(&shell_provider(&script), ProviderRequest::new("p")).await;
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], StreamEvent::Token { text } if text == "Hello"));
    assert!(matches!(&events[1], StreamEvent::Token { text } if text == " world"));
    assert!(matches!(&events[2], StreamEvent::Done { .. }));
}

#[tokio::test]
async fn test_item_completed_text_is_a_token() {
    let script = format!(
        "{}{}",
        emit(r#"{"type":"item.completed","item":{"text":"whole answer"}}"#),
        emit(r#"{"type":"thread.completed"}"#)
    );
    let text = shell_provider(&script)
        .send(ProviderRequest::new("p"))
        .await
        .unwrap();
    assert_eq!(text, "whole answer");
}

#[tokio::test]
async fn test_prompt_is_written_to_stdin_with_newline() {
    let script = r#"IFS= read -r line; printf '{"type":"item.delta","delta":{"text":"%s"}}\n' "$line"; echo '{"type":"turn.completed"}'"#;
    let text = shell_provider(script)
        .send(ProviderRequest::new("Say hello"))
        .await
        .unwrap();
    assert_eq!(text, "Say hello");
}

#[tokio::test]
async fn test_protocol_arguments() {
    let script = r#"printf '{"type":"item.delta","delta":{"text":"%s"}}\n' "$*"; echo '{"type":"turn.completed"}'"#;
    let text = shell_provider(script)
        .send(ProviderRequest::new("p"))
        .await
        .unwrap();
    assert_eq!(text, "exec --json -");
}

#[tokio::test]
async fn test_nonzero_exit_uses_stderr() {
    let provider = shell_provider("echo boom >&2; exit 1");
    let err = provider.send(ProviderRequest::new("p")).await.unwrap_err();
    match err {
        ProviderError::ProcessFailure { message, exit_code } => {
            assert!(message.contains("boom"));
            assert_eq!(exit_code, Some(1));
        }
        other => panic!("expected process failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_nonzero_exit_without_stderr() {
    let err = shell_provider("exit 3")
        .send(ProviderRequest::new("p"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Codex process exited with code 3");
    assert_eq!(err.code(), "PROVIDER_PROCESS_FAILURE");
}

#[tokio::test]
async fn test_unsupported_model_keeps_requested_model() {
    let script = emit(
        r#"{"type":"error","message":"stream error: unexpected status 400 Bad Request: Unsupported model"}"#,
    );
    let request = ProviderRequest {
        prompt: "bad model".to_string(),
        model: Some("claude-3-5-sonnet-20240620".to_string()),
        requested_model: Some("claude-3-5-sonnet-20240620".to_string()),
        ..Default::default()
    };
    let err = shell_provider(&script).send(request).await.unwrap_err();
    assert_eq!(err.code(), "UNSUPPORTED_MODEL");
    assert_eq!(err.requested_model(), Some("claude-3-5-sonnet-20240620"));
}

#[tokio::test]
async fn test_error_event_stops_reading_and_kills_child() {
    let script = format!("{}exec sleep 30", emit(r#"{"type":"error","message":"quota exceeded"}"#));
    let started = Instant::now();
    let events = collect_events(&shell_provider(&script), ProviderRequest::new("p")).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], StreamEvent::Error(ProviderError::Transport(m)) if m == "quota exceeded"));
}

#[tokio::test]
async fn test_unparseable_line_is_protocol_error() {
    let script = "echo 'not json at all'; exec sleep 30";
    let events = collect_events(&shell_provider(script), ProviderRequest::new("p")).await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Error(err @ ProviderError::Protocol { .. }) => {
            assert_eq!(err.to_string(), "failed to parse event: not json at all");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_blank_lines_are_skipped() {
    let script = format!("echo; echo '   '; {}{}", emit(DELTA_HELLO), emit(TURN_COMPLETED));
    let text = shell_provider(&script)
        .send(ProviderRequest::new("p"))
        .await
        .unwrap();
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn test_clean_exit_without_terminal_event() {
    let script = emit(DELTA_HELLO);
    let text = shell_provider(&script)
        .send(ProviderRequest::new("p"))
        .await
        .unwrap();
    assert_eq!(text, "Hello");

    let strict = CodexProvider::new(CodexConfig {
        require_terminal_event: true,
        ..shell_config(&script)
    });
    let err = strict.send(ProviderRequest::new("p")).await.unwrap_err();
    assert_eq!(err.code(), "INCOMPLETE_STREAM");
}

#[tokio::test]
async fn test_timeout_kills_process() {
    let provider = CodexProvider::new(CodexConfig {
        timeout: Some(Duration::from_millis(200)),
        ..shell_config("exec sleep 30")
    });
    let started = Instant::now();
    let err = provider.send(ProviderRequest::new("p")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Timeout(_)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_done_with_lingering_process() {
    let script = format!("{}{}exec sleep 30", emit(DELTA_HELLO), emit(TURN_COMPLETED));
    let provider = CodexProvider::new(CodexConfig {
        exit_grace: Duration::from_millis(100),
        ..shell_config(&script)
    });
    let started = Instant::now();
    let text = collect_text(provider.stream(ProviderRequest::new("p")))
        .await
        .unwrap();
    assert_eq!(text, "Hello");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_spawn_failure() {
    let provider = CodexProvider::new(CodexConfig {
        program: "/nonexistent/codex-binary".to_string(),
        ..Default::default()
    });
    let err = provider.send(ProviderRequest::new("p")).await.unwrap_err();
    assert_eq!(err.code(), "PROVIDER_PROCESS_FAILURE");
    assert!(err.to_string().contains("failed to spawn"));
}

fn process_alive(pid: &str) -> bool {
    std::process::Command::new("kill")
        .args(["-0", pid])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_dropping_stream_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let script = format!(
        "echo $$ > '{}'; {}exec sleep 30",
        pid_file.display(),
        emit(DELTA_HELLO)
    );
    let provider = shell_provider(&script);

    let mut events = provider.stream(ProviderRequest::new("p"));
    let first = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .unwrap();
    assert!(matches!(first, Some(StreamEvent::Token { .. })));

    let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
    assert!(process_alive(&pid));
    drop(events);

    let deadline = Instant::now() + Duration::from_secs(5);
    while process_alive(&pid) {
        assert!(Instant::now() < deadline, "codex process survived cancellation");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
