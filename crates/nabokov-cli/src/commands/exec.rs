//! Single-shot streaming exec command.

use futures::StreamExt;
use nabokov_provider::{GenerationOptions, GenerationService, Message, StreamEvent};
use serde_json::json;
use std::io::Write;

/// Typed error used to propagate a process exit code.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExecExitError {
    pub code: i32,
    pub message: String,
}

/// `nabokov exec` options.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub system: Option<String>,
    pub json: bool,
}

/// Stream one prompt to stdout.
pub async fn run(
    service: &GenerationService,
    prompt: &str,
    options: ExecOptions,
) -> anyhow::Result<()> {
    let messages = vec![Message::user(prompt)];
    let generation = GenerationOptions {
        system: options.system.clone(),
        ..Default::default()
    };
    let mut stream = service.stream_message(&messages, &generation)?;
    let mut stdout = std::io::stdout();

    if options.json {
        writeln!(
            stdout,
            "{}",
            json!({ "type": "start", "metadata": stream.metadata() })
        )?;
    }

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Token { text } => {
                if options.json {
                    writeln!(stdout, "{}", json!({ "type": "token", "text": text }))?;
                } else {
                    write!(stdout, "{text}")?;
                    stdout.flush()?;
                }
            }
            StreamEvent::Done { final_text } => {
                if options.json {
                    writeln!(
                        stdout,
                        "{}",
                        json!({ "type": "done", "finalText": final_text })
                    )?;
                } else {
                    writeln!(stdout)?;
                }
            }
            StreamEvent::Error(err) => {
                if options.json {
                    writeln!(
                        stdout,
                        "{}",
                        json!({
                            "type": "error",
                            "code": err.code(),
                            "message": err.to_string(),
                        })
                    )?;
                } else {
                    writeln!(stdout)?;
                }
                return Err(anyhow::Error::new(ExecExitError {
                    code: 1,
                    message: err.user_message(),
                }));
            }
        }
    }
    Ok(())
}
