//! `clawshell agent`: interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clawshell_agent::{AgentEvent, AgentLoop, ChannelConfirmer, ConfirmationRequest, TurnOutcome};
use clawshell_config::AppConfig;
use clawshell_core::names;
use clawshell_core::tool::{Arguments, ToolCall};
use clawshell_providers::OpenAiCompatProvider;
use clawshell_security::SafetyClassifier;
use clawshell_tools::{ToolContext, default_registry};
use tokio::sync::mpsc;
use tracing::debug;

/// Events buffered between the loop and the renderer.
const EVENT_BUFFER: usize = 32;

/// Lines of tool output echoed to the terminal.
const MAX_PREVIEW_LINES: usize = 12;

pub async fn run(config: AppConfig, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    // Check for an API key early and give a clear error
    if !config.has_api_key() && !is_local(&config.provider.base_url) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    CLAWSHELL_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        eprintln!("  Local servers (http://localhost:...) need no key.");
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let mut agent = build_agent(&config)?;

    if let Some(msg) = message {
        // Single message mode
        let outcome = run_turn(&mut agent, &msg).await;
        return match outcome {
            TurnOutcome::Completed | TurnOutcome::StepLimit => Ok(()),
            TurnOutcome::Failed => Err("the turn failed".into()),
            TurnOutcome::Cancelled => Err("the turn was cancelled".into()),
        };
    }

    // Interactive mode
    println!();
    println!("  clawshell: interactive mode");
    println!();
    println!("  Provider:  {} ({})", config.provider.name, config.provider.base_url);
    println!("  Model:     {}", config.provider.model);
    println!("  Safety:    {}", config.safety.mode);
    println!("  Steps:     {} per request", config.agent.max_steps);
    println!();
    println!("  Type your request and press Enter.");
    println!("  /clear resets the conversation, /compact shrinks it, 'exit' quits.");
    println!();

    loop {
        let Some(line) = read_line("  You > ").await else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" | "/exit" | "/quit" => break,
            "/clear" => {
                agent.clear();
                println!("  Conversation cleared.");
                continue;
            }
            "/compact" => {
                let removed = agent.compact();
                println!("  Removed {removed} message(s) from the context.");
                continue;
            }
            "/help" => {
                println!("  /clear    forget the conversation");
                println!("  /compact  summarize older messages now");
                println!("  exit      quit");
                continue;
            }
            _ => {}
        }

        println!();
        run_turn(&mut agent, line).await;
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Wire provider, tools and safety policy from configuration.
pub fn build_agent(config: &AppConfig) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let provider = OpenAiCompatProvider::from_config(&config.provider)?;

    let ctx = ToolContext::new(config.backup_dir())
        .with_max_output_chars(config.tools.max_output_chars)
        .with_shell_timeout(Duration::from_secs(config.tools.shell_timeout_secs));
    let tools = default_registry(Arc::new(ctx))?;
    let classifier = SafetyClassifier::new(&config.safety)?;

    debug!(tools = ?tools.names(), mode = %config.safety.mode, "Agent ready");
    Ok(AgentLoop::from_config(
        Arc::new(provider),
        Arc::new(tools),
        Arc::new(classifier),
        config,
    ))
}

/// Run one turn, rendering events and answering confirmations on the
/// terminal.
async fn run_turn(agent: &mut AgentLoop, text: &str) -> TurnOutcome {
    let (events_tx, mut events_rx) = mpsc::channel(EVENT_BUFFER);
    let (confirmer, mut requests) = ChannelConfirmer::new(1);

    let renderer = tokio::spawn(async move {
        loop {
            tokio::select! {
                // Drain events first so a prompt never precedes its notice.
                biased;
                event = events_rx.recv() => match event {
                    Some(event) => print_event(&event),
                    None => break,
                },
                Some(request) = requests.recv() => answer(request).await,
            }
        }
    });

    let outcome = agent.handle_user_message(text, &confirmer, &events_tx).await;
    drop(events_tx);
    drop(confirmer);
    let _ = renderer.await;
    outcome
}

async fn answer(request: ConfirmationRequest) {
    let approved = read_line("  Allow? [y/N] ")
        .await
        .is_some_and(|reply| is_yes(&reply));
    if approved {
        request.approve();
    } else {
        println!("  Declined.");
        request.deny();
    }
}

fn print_event(event: &AgentEvent) {
    if let Some(text) = render(event) {
        match event {
            AgentEvent::Thinking { .. } | AgentEvent::Error { .. } => eprintln!("{text}"),
            _ => println!("{text}"),
        }
    }
}

/// Terminal rendering of an event. `None` means nothing to show.
pub fn render(event: &AgentEvent) -> Option<String> {
    let text = match event {
        AgentEvent::Thinking { step } if *step > 1 => format!("  ... step {step}"),
        AgentEvent::Thinking { .. } => return None,
        AgentEvent::PlanningText { text } => indent(text, "  "),
        AgentEvent::Executing {
            name, arguments, ..
        } => format!("  $ {}", describe_call(name, arguments)),
        AgentEvent::ToolResult {
            output,
            error,
            exit_code,
            truncated,
            ..
        } => {
            let mut out = preview(output);
            if let Some(error) = error.as_deref().filter(|e| !e.is_empty()) {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&preview(error));
            }
            if *truncated {
                out.push_str("\n    [output truncated]");
            }
            if *exit_code != 0 {
                out.push_str(&format!("\n    [exit code {exit_code}]"));
            }
            if out.is_empty() {
                return None;
            }
            out
        }
        AgentEvent::ConfirmNeeded {
            name, arguments, ..
        } => format!("  ? {} needs your approval", describe_call(name, arguments)),
        AgentEvent::Blocked { name, reason, .. } => format!("  ! blocked {name}: {reason}"),
        AgentEvent::Response { text } => indent(text, "  Assistant > "),
        AgentEvent::Error { message } => format!("  [Error] {message}"),
    };
    Some(text)
}

/// One-line summary of a call: the command for `shell`, else name and
/// arguments.
fn describe_call(name: &str, arguments: &Arguments) -> String {
    let call = ToolCall::new("", name, arguments.clone());
    match (name, call.str_arg("command")) {
        (names::SHELL, Some(command)) => command.to_string(),
        _ => format!("{name} {}", call.arguments_text()),
    }
}

fn preview(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let mut out: Vec<String> = lines
        .iter()
        .take(MAX_PREVIEW_LINES)
        .map(|line| format!("    {line}"))
        .collect();
    if lines.len() > MAX_PREVIEW_LINES {
        out.push(format!("    ... {} more line(s)", lines.len() - MAX_PREVIEW_LINES));
    }
    out.join("\n")
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_yes(reply: &str) -> bool {
    matches!(reply.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Whether the backend runs on this machine and needs no key.
fn is_local(base_url: &str) -> bool {
    let rest = base_url
        .strip_prefix("http://")
        .or_else(|| base_url.strip_prefix("https://"))
        .unwrap_or(base_url);
    ["localhost", "127.0.0.1", "[::1]"]
        .iter()
        .any(|host| rest.starts_with(host))
}

/// Prompt and read one line from stdin without blocking the runtime.
/// `None` on end of input.
async fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = std::io::stdout().flush();
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    })
    .await
    .ok()
    .flatten()
}
