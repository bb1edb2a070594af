//! Slash-command control surface for the MCP server registry.
//!
//! `/mcp` lines are parsed and dispatched against a [`Registry`]; `add` with
//! no arguments starts the multi-turn [`AddWizard`]; `list` and `test` need a
//! live connection probe, which the caller runs through a [`Prober`] and then
//! feeds back into the formatters.
//!
//! [`Registry`]: tutor_core::registry::Registry
//! [`Prober`]: tutor_core::traits::Prober

mod client;
mod command;
mod format;
mod handler;
mod probe;
mod session;
mod wizard;

pub use client::{probe_kind, HandshakeProber};
pub use command::{
    complete_probe, dispatch, is_mcp_command, parse_command, DispatchOutcome, ParsedCommand,
    ProbeCommand, ProbeRequest, Subcommand, MCP_PREFIX,
};
pub use format::{help_text, list_format, status_format, test_format};
pub use handler::ProbeClientHandler;
pub use probe::{run_probe, BusyFlag, BusyGuard, StreamProber};
pub use session::{McpSession, SessionReply};
pub use wizard::{AddWizard, WizardReply, WizardState, CANCEL_TOKENS};
