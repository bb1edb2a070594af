mod doctor;
mod repl;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tutor_agent::CliAgent;
use tutor_core::config::{AppConfig, ProbeMethod};
use tutor_core::history::CommandHistory;
use tutor_core::registry::Registry;
use tutor_core::traits::{AgentClient, Prober};
use tutor_mcp::{HandshakeProber, McpSession, StreamProber};
use tutor_tui::Backends;

const DEFAULT_CONFIG: &str = "tutor.toml";

#[derive(Parser)]
#[command(name = "tutor", version, about = "Agent shell with a managed MCP server registry")]
struct Cli {
    /// Path to config file (defaults to ./tutor.toml when present)
    #[arg(short, long, env = "TUTOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the terminal UI (default)
    Tui,
    /// Line-based interactive mode on stdin/stdout
    Repl,
    /// Run one `/mcp` command and exit, e.g. `tutor mcp add fs stdio npx -y tool`
    Mcp {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Show the effective configuration
    Config,
    /// Run system health checks
    Doctor,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "tutor", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let command = cli.command.unwrap_or(Commands::Tui);
    init_tracing(&config, matches!(command, Commands::Tui))?;

    match command {
        Commands::Completions { .. } => unreachable!("handled before config load"),
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            println!();
            println!("# registry: {}", config.registry_path().display());
            println!("# history:  {}", config.history_path().display());
            println!("# log:      {}", config.log_path().display());
        }
        Commands::Doctor => doctor::run_doctor(&config),
        Commands::Mcp { words } => {
            let (_, prober) = backends_for(&config);
            let mut session = McpSession::new(Registry::open(config.registry_path()));
            let line = format!("{} {}", tutor_mcp::MCP_PREFIX, words.join(" "));
            repl::run_once(&mut session, &line, prober.as_ref(), probe_timeout(&config)).await?;
        }
        Commands::Repl => {
            let (agent, prober) = backends_for(&config);
            let session = McpSession::new(Registry::open(config.registry_path()));
            let history = CommandHistory::open(config.history_path(), config.history.max_entries);
            repl::run_repl(session, history, agent, prober, &config).await?;
        }
        Commands::Tui => {
            let (agent, prober) = backends_for(&config);
            let session = McpSession::new(Registry::open(config.registry_path()));
            let history = CommandHistory::open(config.history_path(), config.history.max_entries);
            info!(servers = session.registry().len(), "Starting TUI");
            tutor_tui::run_tui(
                session,
                history,
                Backends {
                    agent,
                    prober,
                    probe_timeout: probe_timeout(&config),
                    allowed_tools: config.agent.allowed_tools.clone(),
                    max_turns: config.agent.max_turns,
                },
            )
            .await?;
        }
    }

    Ok(())
}

/// An explicit path must exist; the default path is optional.
fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default(Path::new(DEFAULT_CONFIG))?,
    };
    Ok(config)
}

/// TUI mode logs to `log_path()`, other modes to stderr.
fn init_tracing(config: &AppConfig, to_file: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))
        .unwrap_or_else(|_| EnvFilter::new("tutor=info,warn"));

    if to_file {
        let path = config.log_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
    Ok(())
}

fn probe_timeout(config: &AppConfig) -> Duration {
    Duration::from_secs(config.probe.timeout_secs.max(1))
}

fn backends_for(config: &AppConfig) -> (Arc<dyn AgentClient>, Arc<dyn Prober>) {
    let agent = Arc::new(CliAgent::from_config(&config.agent));
    let prober: Arc<dyn Prober> = match config.probe.method {
        ProbeMethod::Agent => Arc::new(StreamProber::new(
            agent.clone(),
            config.probe.prompt.clone(),
            config.agent.allowed_tools.clone(),
        )),
        ProbeMethod::Handshake => Arc::new(HandshakeProber::new(probe_timeout(config))),
    };
    let agent: Arc<dyn AgentClient> = agent;
    (agent, prober)
}
