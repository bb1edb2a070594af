use tracing::debug;

use tutor_core::error::TutorError;
use tutor_core::registry::Registry;
use tutor_core::types::{ConnectionStatus, ServerEntry, ServerKind};

use crate::format;

/// Prefix that marks a line as an MCP registry command.
pub const MCP_PREFIX: &str = "/mcp";

/// `/mcp` subcommands. Anything unrecognized resolves to `Help`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    List,
    Test,
    Add,
    Remove,
    Enable,
    Disable,
    Status,
    Help,
}

impl Subcommand {
    fn from_token(token: &str) -> Self {
        match token.to_ascii_lowercase().as_str() {
            "list" => Subcommand::List,
            "test" => Subcommand::Test,
            "add" => Subcommand::Add,
            "remove" => Subcommand::Remove,
            "enable" => Subcommand::Enable,
            "disable" => Subcommand::Disable,
            "status" => Subcommand::Status,
            _ => Subcommand::Help,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub subcommand: Subcommand,
    pub args: Vec<String>,
}

/// Commands whose output depends on a live connection probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCommand {
    List,
    Test,
}

/// A probe the caller must run before the command can be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub command: ProbeCommand,
    pub args: Vec<String>,
}

/// Result of dispatching one `/mcp` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Reply is ready to display.
    Text(String),
    /// Start the interactive add wizard.
    EnterWizard,
    /// Run a connection probe, then call [`complete_probe`].
    NeedsProbe(ProbeRequest),
}

/// Whether `line` starts with the `/mcp` prefix (case-insensitive).
pub fn is_mcp_command(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case(MCP_PREFIX))
}

/// Split a command line into subcommand and arguments.
///
/// `"/mcp add myserver"` parses as `Add` with `["myserver"]`. The prefix is
/// optional; an empty remainder means `help`.
pub fn parse_command(line: &str) -> ParsedCommand {
    let mut parts = line.split_whitespace().peekable();
    if parts
        .peek()
        .is_some_and(|first| first.eq_ignore_ascii_case(MCP_PREFIX))
    {
        parts.next();
    }

    let Some(first) = parts.next() else {
        return ParsedCommand {
            subcommand: Subcommand::Help,
            args: Vec::new(),
        };
    };

    ParsedCommand {
        subcommand: Subcommand::from_token(first),
        args: parts.map(str::to_string).collect(),
    }
}

/// Dispatch one `/mcp` line against `registry`.
pub fn dispatch(line: &str, registry: &mut Registry) -> DispatchOutcome {
    let ParsedCommand { subcommand, args } = parse_command(line);
    debug!(?subcommand, args = args.len(), "Dispatching MCP command");

    match subcommand {
        Subcommand::List => DispatchOutcome::NeedsProbe(ProbeRequest {
            command: ProbeCommand::List,
            args,
        }),
        Subcommand::Test => DispatchOutcome::NeedsProbe(ProbeRequest {
            command: ProbeCommand::Test,
            args,
        }),
        Subcommand::Add if args.is_empty() => DispatchOutcome::EnterWizard,
        Subcommand::Add => DispatchOutcome::Text(with_persist_warning(handle_add(&args, registry), registry)),
        Subcommand::Remove => DispatchOutcome::Text(with_persist_warning(handle_remove(&args, registry), registry)),
        Subcommand::Enable => DispatchOutcome::Text(with_persist_warning(handle_toggle(&args, registry, true), registry)),
        Subcommand::Disable => DispatchOutcome::Text(with_persist_warning(handle_toggle(&args, registry, false), registry)),
        Subcommand::Status => DispatchOutcome::Text(handle_status(&args, registry)),
        Subcommand::Help => DispatchOutcome::Text(format::help_text().to_string()),
    }
}

/// Render a probe-backed command once the probe has produced `status`.
pub fn complete_probe(registry: &Registry, request: &ProbeRequest, status: &ConnectionStatus) -> String {
    match request.command {
        ProbeCommand::List => format::list_format(&registry.list(), Some(status)),
        ProbeCommand::Test => format::test_format(registry, request.args.first().map(String::as_str), status),
    }
}

/// `add <name> <type> <command|url> [args...]`.
///
/// Tokens after the URL are ignored for sse/http.
fn handle_add(args: &[String], registry: &mut Registry) -> String {
    if args.len() < 3 {
        return "**Error**: Usage: `/mcp add <name> <type> <command|url> [args...]`".to_string();
    }

    let name = &args[0];
    let kind = match args[1].parse::<ServerKind>() {
        Ok(kind) => kind,
        Err(e) => return format!("**Error**: {}", e),
    };

    if registry.contains(name) {
        return format!("**Error**: Server `{}` already exists.", name);
    }

    let config = ServerEntry::build_config(kind, &args[2], &args[3..]);
    match registry.add(name, config) {
        Ok(()) => format!("**Added** server `{}` ({})", name, kind),
        Err(TutorError::DuplicateName(_)) => format!("**Error**: Server `{}` already exists.", name),
        Err(e) => format!("**Error**: {}", e),
    }
}

fn handle_remove(args: &[String], registry: &mut Registry) -> String {
    let Some(name) = args.first() else {
        return "**Error**: Usage: `/mcp remove <name>`".to_string();
    };
    if registry.remove(name) {
        format!("**Removed** server `{}`", name)
    } else {
        format!("**Error**: Server `{}` not found.", name)
    }
}

fn handle_toggle(args: &[String], registry: &mut Registry, enable: bool) -> String {
    let verb = if enable { "enable" } else { "disable" };
    let Some(name) = args.first() else {
        return format!("**Error**: Usage: `/mcp {} <name>`", verb);
    };

    let found = if enable {
        registry.enable(name)
    } else {
        registry.disable(name)
    };

    match (found, enable) {
        (true, true) => format!("**Enabled** server `{}`", name),
        (true, false) => format!("**Disabled** server `{}`", name),
        (false, _) => format!("**Error**: Server `{}` not found.", name),
    }
}

fn handle_status(args: &[String], registry: &Registry) -> String {
    let Some(name) = args.first() else {
        return format!(
            "**MCP Status**: {}/{} servers enabled",
            registry.enabled_count(),
            registry.len()
        );
    };
    match registry.get(name) {
        Some(entry) => format::status_format(&entry),
        None => format!("**Error**: Server `{}` not found.", name),
    }
}

fn with_persist_warning(text: String, registry: &mut Registry) -> String {
    match registry.take_persist_error() {
        Some(error) => format!("{}\n\n_Warning: changes could not be saved: {}_", text, error),
        None => text,
    }
}
