//! Multi-turn `/mcp add` flow.
//!
//! Each user line advances the wizard by at most one step. The registry is
//! touched only on commit; cancelling at any step leaves it unchanged.

use tracing::{debug, info};

use tutor_core::registry::Registry;
use tutor_core::types::{ServerEntry, ServerKind};

/// Inputs that abort the wizard at any step (case-insensitive).
pub const CANCEL_TOKENS: [&str; 2] = ["cancel", "/cancel"];

/// Where the wizard is. Each state carries only the fields collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WizardState {
    #[default]
    Idle,
    AwaitingName,
    AwaitingKind { name: String },
    AwaitingTarget { name: String, kind: ServerKind },
    /// Only reachable for stdio servers.
    AwaitingArgs { name: String, command: String },
}

impl WizardState {
    /// Step ordinal 0..=3, `None` when idle.
    pub fn step(&self) -> Option<u8> {
        match self {
            WizardState::Idle => None,
            WizardState::AwaitingName => Some(0),
            WizardState::AwaitingKind { .. } => Some(1),
            WizardState::AwaitingTarget { .. } => Some(2),
            WizardState::AwaitingArgs { .. } => Some(3),
        }
    }
}

/// Reply to one wizard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardReply {
    /// Advanced; show the next prompt.
    Prompt(String),
    /// Input rejected; the wizard stays on the same step.
    Rejected(String),
    Committed { name: String, text: String },
    Cancelled(String),
}

impl WizardReply {
    pub fn text(&self) -> &str {
        match self {
            WizardReply::Prompt(t) | WizardReply::Rejected(t) | WizardReply::Cancelled(t) => t,
            WizardReply::Committed { text, .. } => text,
        }
    }
}

#[derive(Debug, Default)]
pub struct AddWizard {
    state: WizardState,
}

impl AddWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != WizardState::Idle
    }

    pub fn step(&self) -> Option<u8> {
        self.state.step()
    }

    /// Enter the first step and return its prompt.
    pub fn start(&mut self) -> String {
        debug!("Starting add wizard");
        self.state = WizardState::AwaitingName;
        "**Add MCP Server** (step 1/4)\n\nEnter a name for the server, or `cancel` to abort.".to_string()
    }

    /// Feed one line of user input.
    pub fn handle(&mut self, input: &str, registry: &mut Registry) -> WizardReply {
        let input = input.trim();

        if self.is_active() && is_cancel(input) {
            debug!(step = ?self.step(), "Add wizard cancelled");
            self.state = WizardState::Idle;
            return WizardReply::Cancelled("Cancelled adding MCP server.".to_string());
        }

        match std::mem::take(&mut self.state) {
            WizardState::Idle => WizardReply::Rejected("No server is being added.".to_string()),

            WizardState::AwaitingName => {
                if input.is_empty() {
                    self.state = WizardState::AwaitingName;
                    return WizardReply::Rejected("**Error**: Name cannot be empty. Enter a server name:".to_string());
                }
                if input.chars().any(char::is_whitespace) {
                    self.state = WizardState::AwaitingName;
                    return WizardReply::Rejected(
                        "**Error**: Name cannot contain spaces. Enter a server name:".to_string(),
                    );
                }
                if registry.contains(input) {
                    self.state = WizardState::AwaitingName;
                    return WizardReply::Rejected(format!(
                        "**Error**: Server `{}` already exists. Enter a different name:",
                        input
                    ));
                }
                self.state = WizardState::AwaitingKind {
                    name: input.to_string(),
                };
                WizardReply::Prompt(format!(
                    "**Server type** (step 2/4) for `{}`: `stdio`, `sse`, or `http`",
                    input
                ))
            }

            WizardState::AwaitingKind { name } => match input.parse::<ServerKind>() {
                Ok(kind) => {
                    let prompt = if kind.is_remote() {
                        format!("**URL** (step 3/4) for the {} endpoint:", kind)
                    } else {
                        "**Command** (step 3/4) to launch the server, e.g. `npx`:".to_string()
                    };
                    self.state = WizardState::AwaitingTarget { name, kind };
                    WizardReply::Prompt(prompt)
                }
                Err(e) => {
                    self.state = WizardState::AwaitingKind { name };
                    WizardReply::Rejected(format!("**Error**: {}", e))
                }
            },

            WizardState::AwaitingTarget { name, kind } => {
                if input.is_empty() {
                    let what = if kind.is_remote() { "URL" } else { "Command" };
                    self.state = WizardState::AwaitingTarget { name, kind };
                    return WizardReply::Rejected(format!("**Error**: {} cannot be empty.", what));
                }
                if kind.is_remote() {
                    return commit(registry, name, kind, input, &[]);
                }
                self.state = WizardState::AwaitingArgs {
                    name,
                    command: input.to_string(),
                };
                WizardReply::Prompt(
                    "**Arguments** (step 4/4), separated by spaces. Leave empty for none:".to_string(),
                )
            }

            WizardState::AwaitingArgs { name, command } => {
                let args: Vec<String> = input.split_whitespace().map(str::to_string).collect();
                commit(registry, name, ServerKind::Stdio, &command, &args)
            }
        }
    }
}

fn commit(
    registry: &mut Registry,
    name: String,
    kind: ServerKind,
    target: &str,
    args: &[String],
) -> WizardReply {
    let config = ServerEntry::build_config(kind, target, args);
    let mut text = match registry.add(&name, config) {
        Ok(()) => {
            info!(server = %name, kind = %kind, "Server added via wizard");
            format!("**Added** server `{}` ({})", name, kind)
        }
        // Name taken since step one.
        Err(e) => return WizardReply::Cancelled(format!("**Error**: {}", e)),
    };
    if let Some(error) = registry.take_persist_error() {
        text.push_str(&format!("\n\n_Warning: changes could not be saved: {}_", error));
    }
    WizardReply::Committed { name, text }
}

fn is_cancel(input: &str) -> bool {
    CANCEL_TOKENS.iter().any(|t| input.eq_ignore_ascii_case(t))
}
