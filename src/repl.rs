use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use tutor_core::config::AppConfig;
use tutor_core::history::CommandHistory;
use tutor_core::traits::{AgentClient, Prober};
use tutor_core::types::{AgentMessage, QueryRequest};
use tutor_mcp::McpSession;

/// Token cancelled on the next Ctrl+C until dropped.
struct Interrupt {
    token: CancellationToken,
    watcher: tokio::task::JoinHandle<()>,
}

impl Interrupt {
    fn arm() -> Self {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.cancel();
            }
        });
        Self { token, watcher }
    }
}

impl Drop for Interrupt {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

fn read_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// Run a single `/mcp` line, continuing on stdin if it opened the add wizard.
pub async fn run_once(
    session: &mut McpSession,
    line: &str,
    prober: &dyn Prober,
    timeout: Duration,
) -> anyhow::Result<()> {
    let interrupt = Interrupt::arm();
    if let Some(reply) = session.handle_line(line, prober, &interrupt.token, timeout).await {
        println!("{}", reply);
    }

    while session.wizard().is_active() {
        let Some(input) = read_line("add> ")? else {
            break;
        };
        if let Some(reply) = session.handle_line(&input, prober, &interrupt.token, timeout).await {
            println!("{}", reply);
        }
    }
    Ok(())
}

/// Plain line-based front end.
pub async fn run_repl(
    mut session: McpSession,
    mut history: CommandHistory,
    agent: Arc<dyn AgentClient>,
    prober: Arc<dyn Prober>,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(config.probe.timeout_secs.max(1));

    println!("Tutor v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "MCP: {}/{} servers enabled",
        session.enabled_count(),
        session.registry().len()
    );
    println!("Type /mcp help for server commands, /quit to exit. Ctrl+C cancels a running request.\n");

    loop {
        let prompt = if session.wizard().is_active() { "add> " } else { "> " };
        let Some(input) = read_line(prompt)? else {
            break; // EOF
        };
        if input.is_empty() && !session.wizard().is_active() {
            continue;
        }
        history.add(&input);

        if !session.wizard().is_active() {
            match input.as_str() {
                "/quit" | "/exit" | "/q" => {
                    println!("Goodbye!");
                    break;
                }
                "/clear" => {
                    print!("\x1b[2J\x1b[H");
                    continue;
                }
                _ => {}
            }
        }

        let interrupt = Interrupt::arm();
        match session.handle_line(&input, prober.as_ref(), &interrupt.token, timeout).await {
            Some(reply) => println!("{}\n", reply),
            None => {
                let request = QueryRequest {
                    prompt: input,
                    mcp_servers: session.registry().enabled_for_invocation(),
                    allowed_tools: config.agent.allowed_tools.clone(),
                    max_turns: config.agent.max_turns,
                };
                if let Err(e) = chat(agent.as_ref(), request, &interrupt.token).await {
                    warn!(error = %e, "Agent query failed");
                    eprintln!("Error: {}\n", e);
                }
            }
        }
    }

    Ok(())
}

/// Stream one agent answer to stdout.
async fn chat(
    agent: &dyn AgentClient,
    request: QueryRequest,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            println!("[cancelled]\n");
            return Ok(());
        }
        result = agent.query(request) => result?,
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                println!("\n[cancelled]\n");
                return Ok(());
            }
            next = stream.next() => match next {
                Some(Ok(AgentMessage::Assistant { text })) if !text.is_empty() => {
                    println!("{}", text);
                }
                Some(Ok(AgentMessage::Result { is_error: true, text })) => {
                    anyhow::bail!(text.unwrap_or_else(|| "agent reported an error".to_string()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    println!();
                    return Ok(());
                }
            },
        }
    }
}
