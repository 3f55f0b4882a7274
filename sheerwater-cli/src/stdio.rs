//! Interactive terminal chat.

use serde_json::Value;
use sheerwater_core::chat::ToolCallObserver;
use sheerwater_core::model::{ModelClient, Usage};
use sheerwater_core::service::{ChatService, SendMessageResult};
use sheerwater_core::types::{Artifact, ArtifactKind};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum StdioError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Default)]
struct SessionState {
    conversation_id: Option<String>,
    last_artifacts: Vec<Artifact>,
    last_usage: Option<Usage>,
    total_usage: Usage,
}

impl SessionState {
    fn reset(&mut self) {
        self.conversation_id = None;
        self.last_artifacts.clear();
        self.last_usage = None;
    }

    fn record(&mut self, result: &SendMessageResult) {
        self.conversation_id = Some(result.conversation_id.clone());
        self.last_artifacts = result.artifacts.clone();
        self.last_usage = Some(result.usage);
        self.total_usage += result.usage;
    }
}

enum LoopControl {
    Continue,
    Exit,
}

pub async fn run<M>(service: Arc<ChatService<M>>, user: &str) -> Result<(), StdioError>
where
    M: ModelClient + 'static,
{
    let mut stdout = io::stdout();
    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();
    let mut state = SessionState::default();

    print_banner(&mut stdout).await?;

    loop {
        prompt(&mut stdout).await?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            write_line(&mut stdout, "\nBye.").await?;
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            match handle_command(input, &mut state, service.as_ref(), &mut stdout).await? {
                LoopControl::Continue => continue,
                LoopControl::Exit => break,
            }
        } else {
            handle_prompt(service.as_ref(), user, &mut state, input, &mut stdout).await?;
        }
    }

    stdout.flush().await?;
    Ok(())
}

async fn handle_command<M: ModelClient>(
    input: &str,
    state: &mut SessionState,
    service: &ChatService<M>,
    stdout: &mut io::Stdout,
) -> Result<LoopControl, StdioError> {
    let name = input
        .trim_start_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    debug!(command = %name, "Processing chat command");

    match name.as_str() {
        "help" | "?" => print_help(stdout).await?,
        "exit" | "quit" | "q" => {
            write_line(stdout, "Bye.").await?;
            return Ok(LoopControl::Exit);
        }
        "new" => {
            state.reset();
            write_line(stdout, "Started a new conversation.").await?;
        }
        "tools" => {
            let tools = service.list_tools();
            if tools.is_empty() {
                write_line(stdout, "The tool server advertises no tools.").await?;
            }
            for tool in tools {
                write_line(stdout, &format!("  {:<28} {}", tool.name, tool.description)).await?;
            }
        }
        "artifacts" => print_artifacts(stdout, &state.last_artifacts).await?,
        "usage" => {
            let last = match &state.last_usage {
                Some(usage) => format!("Last reply : {}", format_usage(usage)),
                None => "No replies yet.".to_string(),
            };
            write_line(stdout, &last).await?;
            write_line(
                stdout,
                &format!("Session    : {}", format_usage(&state.total_usage)),
            )
            .await?;
        }
        other => {
            write_line(
                stdout,
                &format!("Unknown command '/{other}'. Type /help for the list."),
            )
            .await?;
        }
    }
    Ok(LoopControl::Continue)
}

async fn handle_prompt<M: ModelClient>(
    service: &ChatService<M>,
    user: &str,
    state: &mut SessionState,
    message: &str,
    stdout: &mut io::Stdout,
) -> Result<(), StdioError> {
    info!(conversation = ?state.conversation_id, "Sending chat message");
    let observer: ToolCallObserver = Arc::new(|name: &str, input: &Value| {
        println!("  [tool] {name} {input}");
    });
    let request = service.send_message_observed(
        user,
        message,
        state.conversation_id.as_deref(),
        Some(observer),
    );

    // Dropping the request abandons it; the shared connection stays usable.
    let outcome = tokio::select! {
        outcome = request => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(result)) => {
            write_line(stdout, "").await?;
            write_line(stdout, &result.response).await?;
            if !result.artifacts.is_empty() {
                write_line(
                    stdout,
                    &format!(
                        "\n({} chart(s) generated; /artifacts to show)",
                        result.artifacts.len()
                    ),
                )
                .await?;
            }
            state.record(&result);
        }
        Some(Err(err)) => {
            error!(%err, "Chat request failed");
            write_line(stdout, "\nRequest failed:").await?;
            write_line(stdout, &err.user_message()).await?;
        }
        None => {
            warn!("Request abandoned by user");
            write_line(stdout, "\nRequest cancelled.").await?;
        }
    }

    stdout.flush().await?;
    Ok(())
}

async fn print_artifacts(stdout: &mut io::Stdout, artifacts: &[Artifact]) -> io::Result<()> {
    if artifacts.is_empty() {
        return write_line(stdout, "The last reply produced no charts.").await;
    }
    for (index, artifact) in artifacts.iter().enumerate() {
        let line = match artifact.kind {
            ArtifactKind::Url => format!("  {}. {}", index + 1, artifact.payload),
            ArtifactKind::InlineImage => {
                format!("  {}. inline image ({} bytes)", index + 1, artifact.payload.len())
            }
        };
        write_line(stdout, &line).await?;
    }
    Ok(())
}

fn format_usage(usage: &Usage) -> String {
    format!(
        "{} input + {} output = {} tokens",
        usage.input_tokens, usage.output_tokens, usage.total_tokens
    )
}

async fn print_banner(stdout: &mut io::Stdout) -> io::Result<()> {
    write_line(stdout, "Sheerwater chat. Ask about forecast skill, metrics or charts.").await?;
    write_line(stdout, "Type /help for commands. Ctrl-C cancels a running request.").await
}

async fn print_help(stdout: &mut io::Stdout) -> io::Result<()> {
    write_line(stdout, "\nCommands:").await?;
    write_line(stdout, "  /help        Show this help").await?;
    write_line(stdout, "  /new         Start a new conversation").await?;
    write_line(stdout, "  /tools       List the tools available to the assistant").await?;
    write_line(stdout, "  /artifacts   Show charts from the last reply").await?;
    write_line(stdout, "  /usage       Token usage of the last reply and this session").await?;
    write_line(stdout, "  /exit        Quit").await
}

async fn prompt(stdout: &mut io::Stdout) -> io::Result<()> {
    stdout.write_all(b"you> ").await?;
    stdout.flush().await
}

async fn write_line(stdout: &mut io::Stdout, line: &str) -> io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_line_shows_all_counts() {
        assert_eq!(
            format_usage(&Usage::new(1200, 300)),
            "1200 input + 300 output = 1500 tokens"
        );
    }

    #[test]
    fn reset_keeps_session_totals() {
        let mut state = SessionState::default();
        state.record(&SendMessageResult {
            conversation_id: "c1".into(),
            response: "hi".into(),
            tool_calls: Vec::new(),
            artifacts: vec![Artifact::url("https://charts/1.html")],
            usage: Usage::new(10, 5),
            rate_limit: None,
        });
        state.reset();
        assert!(state.conversation_id.is_none());
        assert!(state.last_artifacts.is_empty());
        assert_eq!(state.total_usage, Usage::new(10, 5));
    }
}
