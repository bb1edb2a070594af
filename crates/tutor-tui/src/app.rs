use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use ratatui::backend::Backend;
use ratatui::Terminal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tutor_core::event::AppEventBus;
use tutor_core::history::CommandHistory;
use tutor_core::traits::{AgentClient, Prober};
use tutor_core::types::{AgentMessage, AppEvent, QueryRequest};
use tutor_mcp::{run_probe, McpSession, ProbeRequest, SessionReply};

use crate::event::{EventLoop, TuiEvent};
use crate::input::{InputAction, InputHandler};
use crate::ui;

/// Role for display messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    /// Output of an `/mcp` command or the add wizard.
    Command,
    Error,
    System,
}

#[derive(Debug, Clone)]
pub struct DisplayMessage {
    pub role: MessageRole,
    pub text: String,
}

/// Collaborators the TUI talks to.
#[derive(Clone)]
pub struct Backends {
    pub agent: Arc<dyn AgentClient>,
    pub prober: Arc<dyn Prober>,
    pub probe_timeout: Duration,
    pub allowed_tools: Vec<String>,
    pub max_turns: Option<u32>,
}

struct PendingProbe {
    id: u64,
    request: ProbeRequest,
    cancel: CancellationToken,
}

/// What keeps the status bar spinning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Probing,
    Thinking,
}

/// Application state.
pub struct App {
    pub messages: Vec<DisplayMessage>,
    pub streaming_text: String,
    pub input: InputHandler,
    pub session: McpSession,
    pub scroll_offset: usize,
    pub tick_count: usize,
    backends: Backends,
    bus: AppEventBus,
    probe: Option<PendingProbe>,
    agent_cancel: Option<CancellationToken>,
    next_probe_id: u64,
}

impl App {
    pub fn new(session: McpSession, history: CommandHistory, backends: Backends) -> Self {
        Self {
            messages: vec![DisplayMessage {
                role: MessageRole::System,
                text: "Tutor. Type /mcp help for server commands, /quit to exit.".to_string(),
            }],
            streaming_text: String::new(),
            input: InputHandler::new(history),
            session,
            scroll_offset: 0,
            tick_count: 0,
            backends,
            bus: AppEventBus::default(),
            probe: None,
            agent_cancel: None,
            next_probe_id: 0,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AppEvent> {
        self.bus.subscribe()
    }

    pub fn activity(&self) -> Activity {
        if self.probe.is_some() {
            Activity::Probing
        } else if self.agent_cancel.is_some() {
            Activity::Thinking
        } else {
            Activity::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.activity() != Activity::Idle
    }

    fn push(&mut self, role: MessageRole, text: impl Into<String>) {
        self.messages.push(DisplayMessage {
            role,
            text: text.into(),
        });
        self.scroll_offset = 0;
    }

    /// Handle an Enter press. Returns false when the user asked to quit.
    ///
    /// While the add wizard is running every line, blank or built-in, goes
    /// to it; otherwise `/quit`, `/exit`, `/q` and `/clear` act locally and
    /// blank lines are dropped.
    pub fn enter_line(&mut self, text: String) -> bool {
        if !self.session.wizard().is_active() {
            match text.as_str() {
                "/quit" | "/exit" | "/q" => return false,
                "/clear" => {
                    self.clear();
                    return true;
                }
                "" => return true,
                _ => {}
            }
        }
        self.submit(text);
        true
    }

    /// Route one submitted line. Must run inside a tokio runtime.
    pub fn submit(&mut self, text: String) {
        self.push(MessageRole::User, text.clone());

        match self.session.submit(&text) {
            SessionReply::Text(reply) => self.push(MessageRole::Command, reply),
            SessionReply::Probe {
                request,
                servers,
                guard,
            } => {
                self.next_probe_id += 1;
                let id = self.next_probe_id;
                let cancel = CancellationToken::new();
                let prober = self.backends.prober.clone();
                let timeout = self.backends.probe_timeout;
                let bus = self.bus.clone();
                let token = cancel.clone();

                info!(request_id = id, servers = servers.len(), "Starting connection probe");
                tokio::spawn(async move {
                    let outcome = run_probe(&*prober, servers, &token, timeout).await;
                    drop(guard);
                    bus.publish(AppEvent::ProbeFinished {
                        request_id: id,
                        outcome,
                    });
                });

                self.probe = Some(PendingProbe { id, request, cancel });
            }
            SessionReply::NotHandled => self.start_chat(text),
        }
    }

    fn start_chat(&mut self, prompt: String) {
        if self.agent_cancel.is_some() {
            self.push(MessageRole::Error, "Still answering the previous message. Press Esc to cancel it.");
            return;
        }

        let request = QueryRequest {
            prompt,
            mcp_servers: self.session.registry().enabled_for_invocation(),
            allowed_tools: self.backends.allowed_tools.clone(),
            max_turns: self.backends.max_turns,
        };
        let cancel = CancellationToken::new();
        let agent = self.backends.agent.clone();
        let bus = self.bus.clone();
        let token = cancel.clone();

        debug!(servers = request.mcp_servers.len(), "Starting agent query");
        tokio::spawn(async move {
            stream_agent(agent, request, token, bus).await;
        });

        self.streaming_text.clear();
        self.agent_cancel = Some(cancel);
    }

    /// Abort in-flight work. Returns false if nothing was running.
    pub fn cancel(&mut self) -> bool {
        let mut cancelled = false;
        if let Some(probe) = &self.probe {
            probe.cancel.cancel();
            cancelled = true;
        }
        if let Some(token) = &self.agent_cancel {
            token.cancel();
            cancelled = true;
        }
        cancelled
    }

    pub fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::ProbeFinished {
                request_id,
                outcome,
            } => {
                if self.probe.as_ref().map(|p| p.id) != Some(request_id) {
                    debug!(request_id, "Ignoring stale probe result");
                    return;
                }
                let Some(probe) = self.probe.take() else {
                    return;
                };
                let text = self.session.finish_probe(&probe.request, &outcome);
                self.push(MessageRole::Command, text);
            }
            AppEvent::AgentText(text) => {
                if !self.streaming_text.is_empty() {
                    self.streaming_text.push('\n');
                }
                self.streaming_text.push_str(&text);
            }
            AppEvent::AgentDone => {
                self.agent_cancel = None;
                self.flush_streaming();
            }
            AppEvent::AgentError(error) => {
                self.agent_cancel = None;
                self.flush_streaming();
                self.push(MessageRole::Error, error);
            }
            AppEvent::AgentCancelled => {
                self.agent_cancel = None;
                self.flush_streaming();
                self.push(MessageRole::System, "Cancelled.");
            }
        }
    }

    fn flush_streaming(&mut self) {
        if !self.streaming_text.is_empty() {
            let text = std::mem::take(&mut self.streaming_text);
            self.push(MessageRole::Assistant, text);
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.push(MessageRole::System, "Cleared.");
    }
}

/// Forward one agent query to the bus until it ends or `cancel` fires.
async fn stream_agent(
    agent: Arc<dyn AgentClient>,
    request: QueryRequest,
    cancel: CancellationToken,
    bus: AppEventBus,
) {
    let started = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            bus.publish(AppEvent::AgentCancelled);
            return;
        }
        result = agent.query(request) => result,
    };

    let mut stream = match started {
        Ok(stream) => stream,
        Err(e) => {
            bus.publish(AppEvent::AgentError(e.to_string()));
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Agent query cancelled");
                bus.publish(AppEvent::AgentCancelled);
                return;
            }
            next = stream.next() => match next {
                Some(Ok(AgentMessage::Assistant { text })) if !text.is_empty() => {
                    bus.publish(AppEvent::AgentText(text));
                }
                Some(Ok(AgentMessage::Result { is_error: true, text })) => {
                    bus.publish(AppEvent::AgentError(
                        text.unwrap_or_else(|| "agent reported an error".to_string()),
                    ));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    bus.publish(AppEvent::AgentError(e.to_string()));
                    return;
                }
                None => {
                    bus.publish(AppEvent::AgentDone);
                    return;
                }
            },
        }
    }
}

/// Main app loop.
pub async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> anyhow::Result<()> {
    let mut events = EventLoop::new(app.subscribe());

    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        let Some(event) = events.next().await else {
            break;
        };
        match event {
            TuiEvent::Key(key) => match app.input.handle_key(key) {
                InputAction::Interrupt => {
                    if !app.cancel() {
                        break;
                    }
                }
                InputAction::Cancel => {
                    app.cancel();
                }
                InputAction::Submit(text) => {
                    if !app.enter_line(text) {
                        break;
                    }
                }
                InputAction::ScrollUp => {
                    app.scroll_offset = app.scroll_offset.saturating_add(3);
                }
                InputAction::ScrollDown => {
                    app.scroll_offset = app.scroll_offset.saturating_sub(3);
                }
                InputAction::None => {}
            },
            TuiEvent::App(event) => app.handle_app_event(event),
            TuiEvent::Tick => {
                app.tick_count = app.tick_count.wrapping_add(1);
            }
        }
    }

    app.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tutor_core::registry::Registry;
    use tutor_test_utils::{registry_with, MockAgent, PendingProber, StaticProber};

    fn backends(agent: MockAgent, prober: Arc<dyn Prober>) -> Backends {
        Backends {
            agent: Arc::new(agent),
            prober,
            probe_timeout: Duration::from_secs(5),
            allowed_tools: vec!["Read".into()],
            max_turns: None,
        }
    }

    fn app_with(agent: MockAgent, prober: Arc<dyn Prober>) -> App {
        let registry = registry_with(&[("fs", json!({"type": "stdio", "command": "npx", "args": []}))]);
        App::new(McpSession::new(registry), CommandHistory::in_memory(), backends(agent, prober))
    }

    async fn pump(app: &mut App, rx: &mut tokio::sync::broadcast::Receiver<AppEvent>) {
        let event = rx.recv().await.unwrap();
        app.handle_app_event(event);
    }

    fn last(app: &App) -> &DisplayMessage {
        app.messages.last().unwrap()
    }

    fn press_line(app: &mut App, line: &str) -> bool {
        use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

        for c in line.chars() {
            app.input.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
        match app.input.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)) {
            InputAction::Submit(text) => app.enter_line(text),
            other => panic!("Enter produced {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wizard_args_step_accepts_empty_enter() {
        let mut app = App::new(
            McpSession::new(Registry::in_memory()),
            CommandHistory::in_memory(),
            backends(MockAgent::new(vec![]), Arc::new(PendingProber)),
        );
        for line in ["/mcp add", "fs", "stdio", "node"] {
            assert!(press_line(&mut app, line));
        }
        assert_eq!(app.session.wizard().step(), Some(3));

        assert!(press_line(&mut app, ""));
        assert!(!app.session.wizard().is_active());
        let entry = app.session.registry().get("fs").unwrap();
        assert_eq!(entry.command(), "node");
        assert!(entry.args().is_empty());
        assert_eq!(last(&app).text, "**Added** server `fs` (stdio)");
    }

    #[tokio::test]
    async fn test_builtins_go_to_wizard_while_active() {
        let mut app = app_with(MockAgent::new(vec![]), Arc::new(PendingProber));
        assert!(press_line(&mut app, "/mcp add"));

        assert!(press_line(&mut app, "/quit"));
        assert_eq!(app.session.wizard().step(), Some(1));
        assert!(press_line(&mut app, "/clear"));
        assert_eq!(app.session.wizard().step(), Some(1));
        assert!(last(&app).text.contains("Invalid type `/clear`"));

        assert!(press_line(&mut app, "cancel"));
        assert!(!app.session.wizard().is_active());
        assert!(app.session.registry().get("/quit").is_none());

        let shown = app.messages.len();
        assert!(press_line(&mut app, ""));
        assert_eq!(app.messages.len(), shown);
        assert!(press_line(&mut app, "/clear"));
        assert_eq!(app.messages.len(), 1);
        assert!(!press_line(&mut app, "/quit"));
    }

    #[tokio::test]
    async fn test_sync_command_replies_inline() {
        let mut app = app_with(MockAgent::new(vec![]), Arc::new(PendingProber));
        app.submit("/mcp status".into());
        assert_eq!(last(&app).role, MessageRole::Command);
        assert_eq!(last(&app).text, "**MCP Status**: 1/1 servers enabled");
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn test_probe_result_rendered() {
        let mut app = app_with(MockAgent::new(vec![]), Arc::new(StaticProber::new([("fs", "connected")])));
        let mut rx = app.subscribe();

        app.submit("/mcp list".into());
        assert_eq!(app.activity(), Activity::Probing);
        pump(&mut app, &mut rx).await;

        assert!(!app.is_busy());
        assert!(!app.session.is_busy());
        assert!(last(&app).text.contains("| fs | stdio | yes | connected | npx |"));
    }

    #[tokio::test]
    async fn test_cancel_probe() {
        let mut app = app_with(MockAgent::new(vec![]), Arc::new(PendingProber));
        let mut rx = app.subscribe();

        app.submit("/mcp test".into());
        assert!(app.cancel());
        pump(&mut app, &mut rx).await;

        assert_eq!(last(&app).text, "Connection test cancelled.");
        assert!(!app.is_busy());
        assert!(!app.session.is_busy());
        assert!(!app.cancel());
    }

    #[tokio::test]
    async fn test_chat_streams_assistant_text() {
        let agent = MockAgent::new(vec![
            json!({"type": "system", "subtype": "init", "mcp_servers": []}),
            json!({"type": "assistant", "message": {"content": [{"type": "text", "text": "Hello"}]}}),
            json!({"type": "assistant", "message": {"content": [{"type": "text", "text": "again"}]}}),
            json!({"type": "result", "is_error": false}),
        ]);
        let mut app = app_with(agent.clone(), Arc::new(PendingProber));
        let mut rx = app.subscribe();

        app.submit("hi".into());
        assert_eq!(app.activity(), Activity::Thinking);
        for _ in 0..3 {
            pump(&mut app, &mut rx).await;
        }

        assert!(!app.is_busy());
        assert_eq!(last(&app).role, MessageRole::Assistant);
        assert_eq!(last(&app).text, "Hello\nagain");

        let request = agent.last_request().unwrap();
        assert_eq!(request.prompt, "hi");
        assert!(request.mcp_servers.contains_key("fs"));
        assert_eq!(request.allowed_tools, vec!["Read"]);
    }

    #[tokio::test]
    async fn test_chat_cancel() {
        let agent = MockAgent::new(vec![
            json!({"type": "assistant", "message": {"content": [{"type": "text", "text": "slow"}]}}),
        ])
        .with_delay(Duration::from_secs(30));
        let mut app = app_with(agent, Arc::new(PendingProber));
        let mut rx = app.subscribe();

        app.submit("hi".into());
        app.submit("again".into());
        assert_eq!(last(&app).role, MessageRole::Error);

        assert!(app.cancel());
        pump(&mut app, &mut rx).await;
        assert_eq!(last(&app).text, "Cancelled.");
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn test_agent_error_reported() {
        let mut app = app_with(MockAgent::failing("not installed"), Arc::new(PendingProber));
        let mut rx = app.subscribe();
        app.submit("hi".into());
        pump(&mut app, &mut rx).await;
        assert_eq!(last(&app).role, MessageRole::Error);
        assert!(last(&app).text.contains("not installed"));
    }

    #[tokio::test]
    async fn test_wizard_through_app() {
        let mut app = app_with(MockAgent::new(vec![]), Arc::new(PendingProber));
        for line in ["/mcp add", "api", "http", "https://x.test/mcp"] {
            app.submit(line.into());
        }
        assert_eq!(last(&app).text, "**Added** server `api` (http)");
        assert_eq!(app.session.enabled_count(), 2);
    }
}
