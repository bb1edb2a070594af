use tutor_core::registry::Registry;
use tutor_core::types::{ConnectionStatus, ServerEntry, ServerKind};

const HELP: &str = "**MCP Server Commands**

- `/mcp list` - List all configured servers with connection status
- `/mcp test [name]` - Test MCP server connections
- `/mcp add` - Add a new server (interactive)
- `/mcp add <name> <type> <cmd|url> [args]` - Add server directly
- `/mcp remove <name>` - Remove a server
- `/mcp enable <name>` - Enable a server
- `/mcp disable <name>` - Disable a server
- `/mcp status [name]` - Show server config details
- `/mcp help` - Show this help

**Server Types**
- `stdio` - Local process (command + args)
- `sse` - Server-Sent Events endpoint (URL)
- `http` - HTTP endpoint (URL)";

pub fn help_text() -> &'static str {
    HELP
}

/// Render the server table.
///
/// The connection column shows the probed status when `status` has the
/// server, `—` for a disabled server, and `unknown` otherwise.
pub fn list_format(servers: &[ServerEntry], status: Option<&ConnectionStatus>) -> String {
    if servers.is_empty() {
        return "**MCP Servers**\n\nNo servers configured. Use `/mcp add` to add one.".to_string();
    }

    let mut lines = vec![
        "**MCP Servers**\n".to_string(),
        "| Name | Type | Enabled | Connection | Target |".to_string(),
        "|------|------|---------|------------|--------|".to_string(),
    ];

    for server in servers {
        let kind = server.kind_str().unwrap_or(ServerKind::Stdio.as_str());
        let enabled = if server.enabled { "yes" } else { "no" };
        let connection = match status.and_then(|s| s.get(&server.name)) {
            Some(probed) => probed.as_str(),
            None if !server.enabled => "—",
            None => "unknown",
        };
        lines.push(format!(
            "| {} | {} | {} | {} | {} |",
            server.name,
            kind,
            enabled,
            connection,
            server.target_display()
        ));
    }

    lines.join("\n")
}

/// Render a connection test report, optionally narrowed to `name`.
pub fn test_format(registry: &Registry, name: Option<&str>, status: &ConnectionStatus) -> String {
    if status.is_empty() {
        return "**MCP Test**\n\nNo enabled servers to test.".to_string();
    }

    let selected = match name {
        Some(name) => match status.get(name) {
            Some(probed) => ConnectionStatus::from([(name.to_string(), probed.clone())]),
            None => {
                return match registry.get(name) {
                    None => format!("**Error**: Server `{}` not found.", name),
                    Some(entry) if !entry.enabled => format!("**Error**: Server `{}` is disabled.", name),
                    Some(_) => format!("**Error**: Server `{}` was not tested.", name),
                };
            }
        },
        None => status.clone(),
    };

    let mut lines = vec!["**MCP Connection Test**\n".to_string()];
    let mut connected = 0;
    let mut failed = 0;
    for (server, probed) in &selected {
        lines.push(format!("- `{}`: **{}**", server, probed));
        if probed == "connected" {
            connected += 1;
        } else {
            failed += 1;
        }
    }
    lines.push(format!("\n**Summary**: {} connected, {} failed", connected, failed));

    lines.join("\n")
}

/// Full field dump of one server.
pub fn status_format(entry: &ServerEntry) -> String {
    let mut lines = vec![
        format!("**Server: {}**\n", entry.name),
        format!("- **Type**: {}", entry.kind_str().unwrap_or("unknown")),
        format!(
            "- **Status**: {}",
            if entry.enabled { "enabled" } else { "disabled" }
        ),
    ];

    if entry.kind() == Some(ServerKind::Stdio) {
        let full = format!("{} {}", entry.command(), entry.args().join(" "));
        lines.push(format!("- **Command**: `{}`", full.trim()));
        let env = entry.env_keys();
        if !env.is_empty() {
            lines.push(format!("- **Env vars**: {}", env.join(", ")));
        }
    } else {
        lines.push(format!("- **URL**: {}", entry.url()));
    }

    lines.join("\n")
}
