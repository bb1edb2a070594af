use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TutorError;

/// Probed connection status per server name, in probe order.
pub type ConnectionStatus = IndexMap<String, String>;

/// Transport kind of an MCP server entry. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Stdio,
    Sse,
    Http,
}

impl ServerKind {
    pub const ALL: [ServerKind; 3] = [ServerKind::Stdio, ServerKind::Sse, ServerKind::Http];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Stdio => "stdio",
            ServerKind::Sse => "sse",
            ServerKind::Http => "http",
        }
    }

    /// Whether the target of this kind is a URL rather than a command.
    pub fn is_remote(&self) -> bool {
        !matches!(self, ServerKind::Stdio)
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerKind {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(ServerKind::Stdio),
            "sse" => Ok(ServerKind::Sse),
            "http" => Ok(ServerKind::Http),
            other => Err(TutorError::InvalidKind(other.to_string())),
        }
    }
}

/// Kind-specific connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerTarget {
    Stdio { command: String, args: Vec<String> },
    Url(String),
}

/// One configured MCP server as seen by callers.
///
/// `config` is the raw mapping as persisted; the typed accessors are views
/// over it and never modify it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEntry {
    pub name: String,
    pub enabled: bool,
    pub config: Map<String, Value>,
}

impl ServerEntry {
    /// Build the raw config mapping for a new entry.
    ///
    /// For stdio `target` is the command and `args` its arguments; for
    /// sse/http `target` is the URL and `args` is ignored.
    pub fn build_config(kind: ServerKind, target: &str, args: &[String]) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("type".into(), Value::String(kind.to_string()));
        match kind {
            ServerKind::Stdio => {
                config.insert("command".into(), Value::String(target.to_string()));
                config.insert(
                    "args".into(),
                    Value::Array(args.iter().cloned().map(Value::String).collect()),
                );
            }
            ServerKind::Sse | ServerKind::Http => {
                config.insert("url".into(), Value::String(target.to_string()));
            }
        }
        config
    }

    /// Raw `type` field, if present.
    pub fn kind_str(&self) -> Option<&str> {
        self.config.get("type").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<ServerKind> {
        self.kind_str().and_then(|k| k.parse().ok())
    }

    pub fn command(&self) -> &str {
        self.config
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn args(&self) -> Vec<String> {
        self.config
            .get("args")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        self.config
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn target(&self) -> Option<ServerTarget> {
        match self.kind()? {
            ServerKind::Stdio => Some(ServerTarget::Stdio {
                command: self.command().to_string(),
                args: self.args(),
            }),
            ServerKind::Sse | ServerKind::Http => Some(ServerTarget::Url(self.url().to_string())),
        }
    }

    /// Short target for table display: command plus the first two args.
    pub fn target_display(&self) -> String {
        match self.target() {
            Some(ServerTarget::Stdio { command, args }) => {
                if args.is_empty() {
                    command
                } else {
                    let shown = args.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
                    let more = if args.len() > 2 { "..." } else { "" };
                    format!("{} {}{}", command, shown, more)
                }
            }
            Some(ServerTarget::Url(url)) => url,
            None => "—".to_string(),
        }
    }

    /// Names of environment bindings carried in the config.
    pub fn env_keys(&self) -> Vec<String> {
        self.config
            .get("env")
            .and_then(Value::as_object)
            .map(|env| env.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// One message read from the agent stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// System/handshake message, e.g. subtype `init` carrying `mcp_servers`.
    System { subtype: String, data: Value },
    Assistant { text: String },
    Result { is_error: bool, text: Option<String> },
    Other(Value),
}

impl AgentMessage {
    /// Decode one stream-JSON message by its `type` discriminator.
    pub fn from_json(value: Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some("system") => AgentMessage::System {
                subtype: value
                    .get("subtype")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                data: value,
            },
            Some("assistant") => {
                let text = value
                    .pointer("/message/content")
                    .and_then(Value::as_array)
                    .map(|blocks| {
                        blocks
                            .iter()
                            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                            .filter_map(|b| b.get("text").and_then(Value::as_str))
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
                AgentMessage::Assistant { text }
            }
            Some("result") => AgentMessage::Result {
                is_error: value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                text: value
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            _ => AgentMessage::Other(value),
        }
    }

    /// Server statuses reported by a system message, in reported order.
    pub fn server_statuses(&self) -> Option<ConnectionStatus> {
        let AgentMessage::System { data, .. } = self else {
            return None;
        };
        let servers = data.get("mcp_servers")?.as_array()?;
        Some(
            servers
                .iter()
                .filter_map(|s| {
                    let name = s.get("name")?.as_str()?;
                    let status = s.get("status").and_then(Value::as_str).unwrap_or("unknown");
                    Some((name.to_string(), status.to_string()))
                })
                .collect(),
        )
    }
}

/// A single request against the agent stream.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub prompt: String,
    /// Enabled servers with placeholders already expanded.
    pub mcp_servers: Map<String, Value>,
    pub allowed_tools: Vec<String>,
    pub max_turns: Option<u32>,
}

/// Result of one verification pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Completed(ConnectionStatus),
    Failed(String),
    Cancelled,
}

/// Events delivered to the front end from background tasks.
#[derive(Debug, Clone)]
pub enum AppEvent {
    ProbeFinished { request_id: u64, outcome: ProbeOutcome },
    AgentText(String),
    AgentDone,
    AgentError(String),
    AgentCancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(config: Value) -> ServerEntry {
        ServerEntry {
            name: "s".into(),
            enabled: true,
            config: config.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_kind_parse_is_case_insensitive() {
        assert_eq!("HTTP".parse::<ServerKind>().unwrap(), ServerKind::Http);
        assert_eq!("stdio".parse::<ServerKind>().unwrap(), ServerKind::Stdio);
        assert!(matches!(
            "ftp".parse::<ServerKind>(),
            Err(TutorError::InvalidKind(k)) if k == "ftp"
        ));
    }

    #[test]
    fn test_build_config_shapes() {
        let stdio = ServerEntry::build_config(ServerKind::Stdio, "npx", &["-y".into(), "tool".into()]);
        assert_eq!(
            Value::Object(stdio),
            json!({"type": "stdio", "command": "npx", "args": ["-y", "tool"]})
        );

        let http = ServerEntry::build_config(ServerKind::Http, "https://x.test/mcp", &["ignored".into()]);
        assert_eq!(Value::Object(http), json!({"type": "http", "url": "https://x.test/mcp"}));
    }

    #[test]
    fn test_target_display_truncates_args() {
        let e = entry(json!({"type": "stdio", "command": "npx", "args": ["-y", "a", "b"]}));
        assert_eq!(e.target_display(), "npx -y a...");

        let e = entry(json!({"type": "stdio", "command": "node"}));
        assert_eq!(e.target_display(), "node");

        let e = entry(json!({"type": "sse", "url": "https://h/sse"}));
        assert_eq!(e.target_display(), "https://h/sse");

        let e = entry(json!({"type": "weird"}));
        assert_eq!(e.target_display(), "—");
        assert!(e.kind().is_none());
    }

    #[test]
    fn test_env_keys() {
        let e = entry(json!({"type": "stdio", "command": "x", "env": {"A": "1", "B": "${B}"}}));
        assert_eq!(e.env_keys(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_agent_message_decoding() {
        let init = AgentMessage::from_json(json!({
            "type": "system",
            "subtype": "init",
            "mcp_servers": [
                {"name": "fs", "status": "connected"},
                {"name": "api", "status": "failed"}
            ]
        }));
        let statuses = init.server_statuses().unwrap();
        assert_eq!(statuses.get("fs").map(String::as_str), Some("connected"));
        assert_eq!(statuses.get("api").map(String::as_str), Some("failed"));
        assert_eq!(statuses.keys().next().map(String::as_str), Some("fs"));

        let text = AgentMessage::from_json(json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "hel"},
                {"type": "tool_use", "name": "Read"},
                {"type": "text", "text": "lo"}
            ]}
        }));
        assert_eq!(text, AgentMessage::Assistant { text: "hello".into() });
        assert!(text.server_statuses().is_none());

        let done = AgentMessage::from_json(json!({"type": "result", "is_error": true, "result": "boom"}));
        assert_eq!(
            done,
            AgentMessage::Result { is_error: true, text: Some("boom".into()) }
        );
    }
}
