use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};

use tutor_core::error::{Result, TutorError};
use tutor_core::traits::Prober;
use tutor_core::types::{ConnectionStatus, ServerEntry, ServerKind, ServerTarget};

use crate::handler::ProbeClientHandler;

type ProbeConnection = RunningService<RoleClient, ProbeClientHandler>;

/// Probes servers by performing the MCP initialize handshake directly.
///
/// All servers are probed concurrently; each connection is closed as soon as
/// the handshake has been observed.
#[derive(Debug, Clone)]
pub struct HandshakeProber {
    timeout: Duration,
}

impl HandshakeProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn probe_one(&self, name: String, config: Map<String, Value>) -> (String, String) {
        let entry = ServerEntry {
            name,
            enabled: true,
            config,
        };

        let status = match tokio::time::timeout(self.timeout, connect(&entry)).await {
            Ok(Ok(mut connection)) => {
                if let Err(e) = connection.close().await {
                    debug!(server = %entry.name, error = %e, "Error closing probe connection");
                }
                "connected".to_string()
            }
            Ok(Err(e)) => {
                warn!(server = %entry.name, error = %e, "MCP handshake failed");
                format!("failed: {}", e)
            }
            Err(_) => {
                warn!(server = %entry.name, "MCP handshake timed out");
                format!("failed: timed out after {}s", self.timeout.as_secs())
            }
        };
        (entry.name, status)
    }
}

impl Prober for HandshakeProber {
    fn probe(&self, servers: Map<String, Value>) -> BoxFuture<'_, Result<ConnectionStatus>> {
        Box::pin(async move {
            let probes = servers.into_iter().map(|(name, config)| {
                let config = match config {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                self.probe_one(name, config)
            });

            let status: ConnectionStatus = join_all(probes).await.into_iter().collect();
            let connected = status.values().filter(|s| *s == "connected").count();
            info!(servers = status.len(), connected, "MCP handshake probe complete");
            Ok(status)
        })
    }
}

async fn connect(entry: &ServerEntry) -> Result<ProbeConnection> {
    let handler = ProbeClientHandler::new(&entry.name);

    // A config without `type` is launched as a local process.
    let target = match entry.kind_str() {
        None => Some(ServerTarget::Stdio {
            command: entry.command().to_string(),
            args: entry.args(),
        }),
        Some(_) => entry.target(),
    };

    match target {
        Some(ServerTarget::Stdio { command, args }) => {
            if command.is_empty() {
                return Err(TutorError::Mcp("no command configured".to_string()));
            }
            let mut cmd = tokio::process::Command::new(&command);
            cmd.args(&args);
            if let Some(env) = entry.config.get("env").and_then(Value::as_object) {
                for (key, value) in env {
                    if let Some(value) = value.as_str() {
                        cmd.env(key, value);
                    }
                }
            }

            let transport = rmcp::transport::TokioChildProcess::new(cmd)
                .map_err(|e| TutorError::Mcp(format!("Failed to spawn {}: {}", command, e)))?;

            handler
                .serve(transport)
                .await
                .map_err(|e| TutorError::Mcp(format!("initialize failed: {}", e)))
        }
        Some(ServerTarget::Url(url)) => {
            if url.is_empty() {
                return Err(TutorError::Mcp("no URL configured".to_string()));
            }
            let transport = StreamableHttpClientTransport::from_uri(url.as_str());

            <ProbeClientHandler as ServiceExt<RoleClient>>::serve(handler, transport)
                .await
                .map_err(|e| TutorError::Mcp(format!("initialize failed: {}", e)))
        }
        None => Err(TutorError::Mcp(format!(
            "unsupported type `{}`",
            entry.kind_str().unwrap_or_default()
        ))),
    }
}

/// Transport kind a config would be probed with, for diagnostics.
pub fn probe_kind(config: &Map<String, Value>) -> Option<ServerKind> {
    match config.get("type").and_then(Value::as_str) {
        None => Some(ServerKind::Stdio),
        Some(kind) => kind.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn servers(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(name, config)| (name.to_string(), config.clone()))
            .collect()
    }

    #[test]
    fn test_probe_kind() {
        let stdio = json!({"command": "npx"});
        assert_eq!(probe_kind(stdio.as_object().unwrap()), Some(ServerKind::Stdio));
        let sse = json!({"type": "SSE", "url": "https://x"});
        assert_eq!(probe_kind(sse.as_object().unwrap()), Some(ServerKind::Sse));
        let bad = json!({"type": "ws"});
        assert_eq!(probe_kind(bad.as_object().unwrap()), None);
    }

    #[tokio::test]
    async fn test_unusable_configs_fail_without_connecting() {
        let prober = HandshakeProber::new(Duration::from_secs(5));
        let status = prober
            .probe(servers(&[
                ("nocmd", json!({"type": "stdio", "args": []})),
                ("nourl", json!({"type": "http"})),
                ("weird", json!({"type": "ws", "url": "ws://x"})),
            ]))
            .await
            .unwrap();

        assert_eq!(status.len(), 3);
        assert_eq!(status["nocmd"], "failed: MCP error: no command configured");
        assert_eq!(status["nourl"], "failed: MCP error: no URL configured");
        assert_eq!(status["weird"], "failed: MCP error: unsupported type `ws`");
    }

    #[tokio::test]
    async fn test_missing_binary_reports_failed() {
        let prober = HandshakeProber::new(Duration::from_secs(5));
        let status = prober
            .probe(servers(&[(
                "ghost",
                json!({"type": "stdio", "command": "/nonexistent/tutor-mcp-server", "args": []}),
            )]))
            .await
            .unwrap();
        assert!(status["ghost"].starts_with("failed: "));
    }

    #[tokio::test]
    async fn test_status_keeps_input_order() {
        let prober = HandshakeProber::new(Duration::from_secs(5));
        let status = prober
            .probe(servers(&[("b", json!({"type": "http"})), ("a", json!({"type": "sse"}))]))
            .await
            .unwrap();
        let names: Vec<&str> = status.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
