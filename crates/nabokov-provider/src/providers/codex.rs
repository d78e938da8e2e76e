//! Codex CLI provider.
//!
//! Spawns `codex exec --json -` per call, writes the prompt to stdin and
//! reads a JSON-lines event stream from stdout:
//!
//! | `type`                                  | effect                      |
//! |-----------------------------------------|-----------------------------|
//! | `item.delta`                            | token from `delta.text`     |
//! | `item.completed`                        | token from `item.text`      |
//! | `turn.completed` / `thread.completed`   | done                        |
//! | `error` / `exception`                   | error from `message`        |
//!
//! Each call owns its child process. The child is killed on every exit path
//! that leaves it running: error events, timeouts, and the consumer
//! dropping the stream.

use crate::error::ProviderError;
use crate::traits::Provider;
use crate::types::{EventStream, ProviderRequest, StreamEvent};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;

/// Model reported when neither the caller nor the configuration names one.
pub const DEFAULT_CODEX_MODEL: &str = "gpt5-codex";

const EVENT_BUFFER: usize = 64;

/// Configuration for the Codex CLI provider.
#[derive(Debug, Clone)]
pub struct CodexConfig {
    /// Executable to run.
    pub program: String,
    /// Arguments placed before the protocol arguments (e.g. `npx codex`).
    pub program_args: Vec<String>,
    /// Model passed when the caller does not ask for one.
    pub model: Option<String>,
    /// Profile passed when the caller does not ask for one.
    pub profile: Option<String>,
    /// Per-call deadline. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Treat a clean exit without `turn.completed` as an incomplete stream.
    pub require_terminal_event: bool,
    /// How long a finished child may take to exit before it is killed.
    pub exit_grace: Duration,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            program: "codex".to_string(),
            program_args: Vec::new(),
            model: None,
            profile: None,
            timeout: None,
            require_terminal_event: false,
            exit_grace: Duration::from_secs(2),
        }
    }
}

/// Provider that drives the Codex CLI as a subprocess.
pub struct CodexProvider {
    config: CodexConfig,
}

impl CodexProvider {
    pub fn new(config: CodexConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodexConfig {
        &self.config
    }
}

impl Default for CodexProvider {
    fn default() -> Self {
        Self::new(CodexConfig::default())
    }
}

impl Provider for CodexProvider {
    fn name(&self) -> &str {
        "codex-cli"
    }

    fn default_model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_CODEX_MODEL)
    }

    fn stream(&self, request: ProviderRequest) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let config = self.config.clone();

        tokio::spawn(async move {
            let requested_model = request.requested_model.clone();
            let terminal = match run(&config, request, &tx).await {
                Ok(RunOutcome::Completed) => StreamEvent::done(),
                Ok(RunOutcome::Cancelled) => {
                    tracing::debug!("codex call cancelled by consumer");
                    return;
                }
                Err(err) => {
                    StreamEvent::Error(err.tag_unsupported_model(requested_model.as_deref()))
                }
            };
            let _ = tx.send(terminal).await;
        });

        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed()
    }
}

/// Build the argument list for one call.
///
/// `exec`, then `--model`, `--profile`, one `--config` per override, then
/// `--json -`, then any extra arguments.
pub fn build_args(config: &CodexConfig, request: &ProviderRequest) -> Vec<String> {
    let mut args = config.program_args.clone();
    args.push("exec".to_string());

    let model = request
        .model
        .as_ref()
        .or(request.options.model.as_ref())
        .or(config.model.as_ref());
    if let Some(model) = model {
        args.push("--model".to_string());
        args.push(model.clone());
    }

    if let Some(profile) = request.options.profile.as_ref().or(config.profile.as_ref()) {
        args.push("--profile".to_string());
        args.push(profile.clone());
    }

    for entry in &request.options.config_overrides {
        args.push("--config".to_string());
        args.push(entry.clone());
    }

    args.push("--json".to_string());
    args.push("-".to_string());
    args.extend(request.options.extra_args.iter().cloned());
    args
}

/// What a single stdout line means.
#[derive(Debug)]
enum LineEvent {
    Token(String),
    Done,
    Error(ProviderError),
    Ignored,
}

fn interpret_line(line: &str) -> LineEvent {
    let event: Value = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(err) => {
            return LineEvent::Error(ProviderError::Protocol {
                raw: line.to_string(),
                reason: err.to_string(),
            })
        }
    };

    let text_at = |pointer: &str| match event.pointer(pointer).and_then(Value::as_str) {
        Some(text) if !text.is_empty() => LineEvent::Token(text.to_string()),
        _ => LineEvent::Ignored,
    };

    match event.get("type").and_then(Value::as_str) {
        Some("item.delta") => text_at("/delta/text"),
        Some("item.completed") => text_at("/item/text"),
        Some("turn.completed") | Some("thread.completed") => LineEvent::Done,
        Some("error") | Some("exception") => {
            let message = event
                .get("message")
                .and_then(Value::as_str)
                .filter(|message| !message.is_empty())
                .unwrap_or("Codex CLI reported an error");
            LineEvent::Error(ProviderError::Transport(message.to_string()))
        }
        _ => LineEvent::Ignored,
    }
}

enum RunOutcome {
    Completed,
    Cancelled,
}

enum ReadOutcome {
    Done,
    Eof,
    Cancelled,
}

async fn run(
    config: &CodexConfig,
    request: ProviderRequest,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<RunOutcome, ProviderError> {
    let args = build_args(config, &request);
    tracing::debug!(program = %config.program, ?args, "spawning codex process");

    let mut child = Command::new(&config.program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProviderError::ProcessFailure {
            message: format!("failed to spawn '{}': {e}", config.program),
            exit_code: None,
        })?;

    let (Some(stdin), Some(stdout), Some(stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        terminate(&mut child).await;
        return Err(ProviderError::ProcessFailure {
            message: "codex process pipes unavailable".to_string(),
            exit_code: None,
        });
    };

    // The prompt is written from its own task so a child that does not
    // drain stdin cannot stall the reader.
    let mut prompt = request.prompt;
    if !prompt.ends_with('\n') {
        prompt.push('\n');
    }
    let writer = tokio::spawn(async move {
        let mut stdin = stdin;
        if let Err(err) = stdin.write_all(prompt.as_bytes()).await {
            tracing::debug!(error = %err, "failed to write prompt to codex stdin");
        }
        let _ = stdin.shutdown().await;
    });

    let stderr_task = tokio::spawn(async move {
        let mut bytes = Vec::new();
        let _ = BufReader::new(stderr).read_to_end(&mut bytes).await;
        String::from_utf8_lossy(&bytes).into_owned()
    });

    let reading = read_events(stdout, tx);
    let result = match config.timeout {
        Some(limit) => tokio::time::timeout(limit, reading)
            .await
            .unwrap_or(Err(ProviderError::Timeout(limit))),
        None => reading.await,
    };

    match result {
        Ok(ReadOutcome::Done) => {
            writer.abort();
            if tokio::time::timeout(config.exit_grace, child.wait())
                .await
                .is_err()
            {
                tracing::debug!("codex process still running after completion, killing");
                terminate(&mut child).await;
            }
            Ok(RunOutcome::Completed)
        }
        Ok(ReadOutcome::Cancelled) => {
            writer.abort();
            terminate(&mut child).await;
            Ok(RunOutcome::Cancelled)
        }
        Ok(ReadOutcome::Eof) => {
            let status = match tokio::time::timeout(config.exit_grace, child.wait()).await {
                Ok(status) => status.map_err(|e| ProviderError::ProcessFailure {
                    message: format!("failed to wait for codex process: {e}"),
                    exit_code: None,
                })?,
                Err(_) => {
                    terminate(&mut child).await;
                    return Err(ProviderError::ProcessFailure {
                        message: "codex process closed stdout but did not exit".to_string(),
                        exit_code: None,
                    });
                }
            };
            // A grandchild may still hold stderr open.
            let stderr_text = match tokio::time::timeout(config.exit_grace, stderr_task).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            };
            tracing::debug!(status = %status, "codex process exited");

            if !status.success() {
                let stderr_text = stderr_text.trim();
                let message = match status.code() {
                    _ if !stderr_text.is_empty() => stderr_text.to_string(),
                    Some(code) => format!("Codex process exited with code {code}"),
                    None => "Codex process was terminated by a signal".to_string(),
                };
                return Err(ProviderError::ProcessFailure {
                    message,
                    exit_code: status.code(),
                });
            }

            if config.require_terminal_event {
                return Err(ProviderError::IncompleteStream(
                    "Codex process exited without a completion event".to_string(),
                ));
            }
            tracing::warn!("codex process exited cleanly without a completion event");
            Ok(RunOutcome::Completed)
        }
        Err(err) => {
            writer.abort();
            terminate(&mut child).await;
            Err(err)
        }
    }
}

/// Read stdout line by line, forwarding tokens until a terminal event, EOF,
/// or the consumer going away.
async fn read_events(
    stdout: ChildStdout,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<ReadOutcome, ProviderError> {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => read,
            _ = tx.closed() => return Ok(ReadOutcome::Cancelled),
        };
        let read = read.map_err(|e| ProviderError::ProcessFailure {
            message: format!("failed to read codex output: {e}"),
            exit_code: None,
        })?;
        if read == 0 {
            return Ok(ReadOutcome::Eof);
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match interpret_line(line) {
            LineEvent::Token(text) => {
                if tx.send(StreamEvent::Token { text }).await.is_err() {
                    return Ok(ReadOutcome::Cancelled);
                }
            }
            LineEvent::Done => return Ok(ReadOutcome::Done),
            LineEvent::Error(err) => return Err(err),
            LineEvent::Ignored => {}
        }
    }
}

async fn terminate(child: &mut Child) {
    if let Err(err) = child.kill().await {
        tracing::debug!(error = %err, "failed to kill codex process");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderOptions;

    #[test]
    fn test_default_args() {
        let args = build_args(&CodexConfig::default(), &ProviderRequest::new("p"));
        assert_eq!(args, vec!["exec", "--json", "-"]);
    }

    #[test]
    fn test_args_with_options() {
        let request = ProviderRequest {
            prompt: "p".into(),
            model: Some("gpt-5".into()),
            requested_model: Some("gpt-5".into()),
            options: ProviderOptions {
                model: None,
                profile: Some("fast".into()),
                config_overrides: vec!["a=1".into(), "b=2".into()],
                extra_args: vec!["--skip-git-repo-check".into()],
            },
        };
        let config = CodexConfig {
            program_args: vec!["codex-wrapper".into()],
            ..Default::default()
        };
        assert_eq!(
            build_args(&config, &request),
            vec![
                "codex-wrapper",
                "exec",
                "--model",
                "gpt-5",
                "--profile",
                "fast",
                "--config",
                "a=1",
                "--config",
                "b=2",
                "--json",
                "-",
                "--skip-git-repo-check",
            ]
        );
    }

    #[test]
    fn test_configured_defaults_fill_in() {
        let config = CodexConfig {
            model: Some("o4".into()),
            profile: Some("work".into()),
            ..Default::default()
        };
        let args = build_args(&config, &ProviderRequest::new("p"));
        assert_eq!(
            args,
            vec!["exec", "--model", "o4", "--profile", "work", "--json", "-"]
        );
    }

    #[test]
    fn test_interpret_lines() {
        assert!(matches!(
            interpret_line(r#"{"type":"item.delta","delta":{"text":"Hi"}}"#),
            LineEvent::Token(t) if t == "Hi"
        ));
        assert!(matches!(
            interpret_line(r#"{"type":"item.completed","item":{"text":"Done text"}}"#),
            LineEvent::Token(t) if t == "Done text"
        ));
        assert!(matches!(
            interpret_line(r#"{"type":"item.delta","delta":{"text":""}}"#),
            LineEvent::Ignored
        ));
        assert!(matches!(
            interpret_line(r#"{"type":"thread.completed"}"#),
            LineEvent::Done
        ));
        assert!(matches!(
            interpret_line(r#"{"type":"session.created"}"#),
            LineEvent::Ignored
        ));
        assert!(matches!(
            interpret_line(r#"{"type":"exception"}"#),
            LineEvent::Error(ProviderError::Transport(m)) if m == "Codex CLI reported an error"
        ));
        assert!(matches!(
            interpret_line("not json"),
            LineEvent::Error(ProviderError::Protocol { raw, .. }) if raw == "not json"
        ));
    }

    #[test]
    fn test_default_model() {
        assert_eq!(CodexProvider::default().default_model(), DEFAULT_CODEX_MODEL);
        let provider = CodexProvider::new(CodexConfig {
            model: Some("o4".into()),
            ..Default::default()
        });
        assert_eq!(provider.default_model(), "o4");
    }
}
