use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tutor_core::registry::Registry;
use tutor_core::traits::Prober;
use tutor_core::types::ProbeOutcome;

use crate::command::{self, DispatchOutcome, ProbeCommand, ProbeRequest};
use crate::format;
use crate::probe::{run_probe, BusyFlag, BusyGuard};
use crate::wizard::AddWizard;

/// What the front end should do with a submitted line.
#[derive(Debug)]
pub enum SessionReply {
    Text(String),
    /// Run a probe over `servers`, then pass the outcome to
    /// [`McpSession::finish_probe`]. The guard holds the busy flag until dropped.
    Probe {
        request: ProbeRequest,
        servers: Map<String, Value>,
        guard: BusyGuard,
    },
    /// Not an MCP line; the caller treats it as chat input.
    NotHandled,
}

/// Routes user lines between the add wizard and the `/mcp` dispatcher.
pub struct McpSession {
    registry: Registry,
    wizard: AddWizard,
    busy: BusyFlag,
}

impl McpSession {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            wizard: AddWizard::new(),
            busy: BusyFlag::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn wizard(&self) -> &AddWizard {
        &self.wizard
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub fn enabled_count(&self) -> usize {
        self.registry.enabled_count()
    }

    /// Handle one submitted line.
    ///
    /// While the wizard is active every line belongs to it, including lines
    /// that look like commands.
    pub fn submit(&mut self, line: &str) -> SessionReply {
        if self.wizard.is_active() {
            let reply = self.wizard.handle(line, &mut self.registry);
            return SessionReply::Text(reply.text().to_string());
        }

        if !command::is_mcp_command(line) {
            return SessionReply::NotHandled;
        }

        match command::dispatch(line, &mut self.registry) {
            DispatchOutcome::Text(text) => SessionReply::Text(text),
            DispatchOutcome::EnterWizard => SessionReply::Text(self.wizard.start()),
            DispatchOutcome::NeedsProbe(request) => match self.busy.try_acquire() {
                Some(guard) => {
                    debug!(command = ?request.command, "Probe requested");
                    SessionReply::Probe {
                        request,
                        servers: self.registry.enabled_for_invocation(),
                        guard,
                    }
                }
                None => SessionReply::Text(
                    "**Error**: A connection test is already running. Press Esc to cancel it.".to_string(),
                ),
            },
        }
    }

    /// Render the result of a probe started by [`submit`](Self::submit).
    pub fn finish_probe(&self, request: &ProbeRequest, outcome: &ProbeOutcome) -> String {
        match (outcome, request.command) {
            (ProbeOutcome::Completed(status), _) => command::complete_probe(&self.registry, request, status),
            (ProbeOutcome::Failed(error), ProbeCommand::List) => format!(
                "{}\n\n_Connection check failed: {}_",
                format::list_format(&self.registry.list(), None),
                error
            ),
            (ProbeOutcome::Failed(error), ProbeCommand::Test) => {
                format!("**Error**: Connection test failed: {}", error)
            }
            (ProbeOutcome::Cancelled, _) => "Connection test cancelled.".to_string(),
        }
    }

    /// Submit `line` and, if it needs one, run the probe inline.
    ///
    /// Returns `None` for lines that are not MCP input.
    pub async fn handle_line<P>(
        &mut self,
        line: &str,
        prober: &P,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Option<String>
    where
        P: Prober + ?Sized,
    {
        match self.submit(line) {
            SessionReply::Text(text) => Some(text),
            SessionReply::NotHandled => None,
            SessionReply::Probe {
                request,
                servers,
                guard,
            } => {
                let outcome = run_probe(prober, servers, cancel, timeout).await;
                drop(guard);
                Some(self.finish_probe(&request, &outcome))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tutor_core::storage::MemoryStorage;
    use tutor_core::types::ConnectionStatus;
    use tutor_test_utils::{registry_with, FailingProber, PendingProber, StaticProber};

    fn text(reply: SessionReply) -> String {
        match reply {
            SessionReply::Text(t) => t,
            other => panic!("expected text, got {:?}", other),
        }
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[test]
    fn test_chat_lines_not_handled() {
        let mut session = McpSession::new(Registry::in_memory());
        assert!(matches!(session.submit("hello there"), SessionReply::NotHandled));
        assert!(matches!(session.submit("/quit"), SessionReply::NotHandled));
    }

    #[test]
    fn test_wizard_captures_lines_until_done() {
        let mut session = McpSession::new(Registry::in_memory());
        let prompt = text(session.submit("/mcp add"));
        assert!(prompt.contains("step 1/4"));

        // Looks like a command but is taken as the name.
        text(session.submit("/mcp"));
        assert_eq!(session.wizard().step(), Some(1));
        text(session.submit("cancel"));
        assert!(!session.wizard().is_active());
        assert!(session.registry().is_empty());

        text(session.submit("/mcp add"));
        for line in ["myapi", "ftp", "http"] {
            text(session.submit(line));
        }
        let done = text(session.submit("https://x.test/mcp"));
        assert_eq!(done, "**Added** server `myapi` (http)");
        assert!(matches!(session.submit("hello"), SessionReply::NotHandled));
    }

    #[test]
    fn test_probe_request_carries_expanded_enabled_servers() {
        let registry = registry_with(&[
            ("on", json!({"type": "http", "url": "https://on/${TUTOR_SESSION_TEST_UNSET}"})),
            ("off", json!({"type": "http", "url": "https://off"})),
        ]);
        let mut session = McpSession::new(registry);
        session.registry_mut().disable("off");

        match session.submit("/mcp list") {
            SessionReply::Probe { request, servers, .. } => {
                assert_eq!(request.command, ProbeCommand::List);
                assert_eq!(servers.len(), 1);
                assert_eq!(servers["on"]["url"], "https://on/");
            }
            other => panic!("expected probe, got {:?}", other),
        }
        assert!(!session.is_busy());
    }

    #[test]
    fn test_overlapping_probe_refused() {
        let mut session = McpSession::new(Registry::in_memory());
        let first = session.submit("/mcp test");
        assert!(session.is_busy());

        let second = text(session.submit("/mcp list"));
        assert!(second.contains("already running"));

        // Non-probe commands still work.
        assert!(text(session.submit("/mcp status")).contains("0/0"));

        drop(first);
        assert!(!session.is_busy());
        assert!(matches!(session.submit("/mcp list"), SessionReply::Probe { .. }));
    }

    #[test]
    fn test_finish_probe_outcomes() {
        let registry = registry_with(&[("a", json!({"type": "http", "url": "https://a"}))]);
        let session = McpSession::new(registry);
        let list = ProbeRequest { command: ProbeCommand::List, args: vec![] };
        let test = ProbeRequest { command: ProbeCommand::Test, args: vec![] };

        let mut status = ConnectionStatus::new();
        status.insert("a".into(), "connected".into());
        let out = session.finish_probe(&list, &ProbeOutcome::Completed(status));
        assert!(out.contains("| a | http | yes | connected | https://a |"));

        let out = session.finish_probe(&list, &ProbeOutcome::Failed("boom".into()));
        assert!(out.contains("| a | http | yes | unknown | https://a |"));
        assert!(out.ends_with("_Connection check failed: boom_"));

        assert_eq!(
            session.finish_probe(&test, &ProbeOutcome::Failed("boom".into())),
            "**Error**: Connection test failed: boom"
        );
        assert_eq!(
            session.finish_probe(&test, &ProbeOutcome::Cancelled),
            "Connection test cancelled."
        );
    }

    #[tokio::test]
    async fn test_handle_line_runs_probe_inline() {
        let registry = registry_with(&[
            ("a", json!({"type": "http", "url": "https://a"})),
            ("b", json!({"type": "stdio", "command": "x", "args": []})),
        ]);
        let mut session = McpSession::new(registry);
        let prober = StaticProber::new([("a", "connected"), ("b", "failed")]);
        let cancel = CancellationToken::new();

        let out = session.handle_line("/mcp test", &prober, &cancel, timeout()).await.unwrap();
        assert!(out.contains("**Summary**: 1 connected, 1 failed"));
        assert!(!session.is_busy());

        let out = session.handle_line("/mcp test b", &prober, &cancel, timeout()).await.unwrap();
        assert!(out.contains("- `b`: **failed**"));
        assert!(!out.contains("`a`"));

        assert!(session.handle_line("chat", &prober, &cancel, timeout()).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_and_cancelled_probe_leave_state_intact() {
        let storage = MemoryStorage::new();
        let mut registry = Registry::load(storage.clone());
        registry
            .add("a", json!({"type": "http", "url": "https://a"}).as_object().cloned().unwrap())
            .unwrap();
        let saves = storage.save_count();
        let mut session = McpSession::new(registry);

        let out = session
            .handle_line("/mcp test", &FailingProber::new("agent exited"), &CancellationToken::new(), timeout())
            .await
            .unwrap();
        assert!(out.contains("Connection test failed: agent exited"));
        assert!(!session.is_busy());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = session
            .handle_line("/mcp list", &PendingProber, &cancel, timeout())
            .await
            .unwrap();
        assert_eq!(out, "Connection test cancelled.");
        assert!(!session.is_busy());

        assert_eq!(session.registry().len(), 1);
        assert_eq!(storage.save_count(), saves);
    }

    #[tokio::test]
    async fn test_no_enabled_servers() {
        let mut session = McpSession::new(Registry::in_memory());
        let out = session
            .handle_line("/mcp test", &FailingProber::new("unused"), &CancellationToken::new(), timeout())
            .await
            .unwrap();
        assert_eq!(out, "**MCP Test**\n\nNo enabled servers to test.");
    }
}
