use std::process::Stdio;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use tokio::io::BufReader;
use tracing::{debug, info};

use tutor_core::config::AgentConfig;
use tutor_core::error::{Result, TutorError};
use tutor_core::traits::AgentClient;
use tutor_core::types::{AgentMessage, QueryRequest};

use crate::stream::message_stream;

/// Agent client that runs the agent CLI in print mode and reads its
/// stream-JSON output.
///
/// Each query spawns one process. The process is killed as soon as the
/// returned stream is dropped, so a caller that only wants the first message
/// can stop reading at any point.
#[derive(Debug, Clone)]
pub struct CliAgent {
    command: String,
    args: Vec<String>,
}

impl CliAgent {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Full argument list for `request`.
    pub fn command_args(&self, request: &QueryRequest) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "-p".to_string(),
            request.prompt.clone(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ]);
        if !request.mcp_servers.is_empty() {
            args.push("--mcp-config".to_string());
            args.push(json!({ "mcpServers": request.mcp_servers }).to_string());
        }
        if !request.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(request.allowed_tools.join(","));
        }
        if let Some(max_turns) = request.max_turns {
            args.push("--max-turns".to_string());
            args.push(max_turns.to_string());
        }
        args
    }
}

impl AgentClient for CliAgent {
    fn query(
        &self,
        request: QueryRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'static, Result<AgentMessage>>>> {
        Box::pin(async move {
            let args = self.command_args(&request);
            debug!(command = %self.command, servers = request.mcp_servers.len(), "Spawning agent query");

            let mut child = tokio::process::Command::new(&self.command)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| TutorError::Agent(format!("Failed to spawn {}: {}", self.command, e)))?;

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| TutorError::Agent("agent stdout not captured".to_string()))?;

            info!(command = %self.command, "Agent query started");

            let messages = Box::pin(message_stream(BufReader::new(stdout)));
            // The child rides along with the stream so dropping one drops both.
            let stream = futures::stream::unfold((child, messages), |(child, mut messages)| async move {
                let next = messages.next().await?;
                Some((next, (child, messages)))
            });

            Ok(stream.boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    #[test]
    fn test_command_args_minimal() {
        let agent = CliAgent::new("claude", vec![]);
        let request = QueryRequest {
            prompt: "hello".into(),
            ..Default::default()
        };
        assert_eq!(
            agent.command_args(&request),
            vec!["-p", "hello", "--output-format", "stream-json", "--verbose"]
        );
    }

    #[test]
    fn test_command_args_full() {
        let agent = CliAgent::new("claude", vec!["--model".into(), "x".into()]);
        let mut servers = Map::new();
        servers.insert("fs".into(), json!({"type": "stdio", "command": "npx", "args": []}));
        let request = QueryRequest {
            prompt: "ping".into(),
            mcp_servers: servers,
            allowed_tools: vec!["Read".into(), "Grep".into()],
            max_turns: Some(1),
        };
        let args = agent.command_args(&request);

        assert_eq!(&args[..2], &["--model", "x"]);
        let config_at = args.iter().position(|a| a == "--mcp-config").unwrap();
        let config: Value = serde_json::from_str(&args[config_at + 1]).unwrap();
        assert_eq!(config["mcpServers"]["fs"]["command"], "npx");
        assert!(args.windows(2).any(|w| w[0] == "--allowedTools" && w[1] == "Read,Grep"));
        assert!(args.windows(2).any(|w| w[0] == "--max-turns" && w[1] == "1"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_agent_error() {
        let agent = CliAgent::new("/nonexistent/tutor-agent-binary", vec![]);
        let result = agent.query(QueryRequest::default()).await;
        assert!(matches!(result, Err(TutorError::Agent(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reads_messages_from_process() {
        // `sh -c <script> -p ...` ignores the generated arguments.
        let script = r#"printf '%s\n' '{"type":"system","subtype":"init","mcp_servers":[{"name":"fs","status":"connected"}]}' '{"type":"result","is_error":false}'"#;
        let agent = CliAgent::new("sh", vec!["-c".into(), script.into()]);
        let mut stream = agent.query(QueryRequest::default()).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        let statuses = first.server_statuses().unwrap();
        assert_eq!(statuses["fs"], "connected");
        let second = stream.next().await.unwrap().unwrap();
        assert!(matches!(second, AgentMessage::Result { is_error: false, .. }));
        assert!(stream.next().await.is_none());
    }
}
