use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};
use crate::expand;
use crate::history::DEFAULT_MAX_ENTRIES;

/// Top-level Tutor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where persistent state lives. Relative file names resolve against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_registry_file")]
    pub registry_file: String,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            registry_file: default_registry_file(),
            history_file: default_history_file(),
            log_file: default_log_file(),
        }
    }
}

fn default_data_dir() -> String { "~/.local/share/tutor".to_string() }
fn default_registry_file() -> String { "mcp_servers.json".to_string() }
fn default_history_file() -> String { "command_history.txt".to_string() }
fn default_log_file() -> String { "tutor.log".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_max")]
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_history_max(),
        }
    }
}

fn default_history_max() -> usize { DEFAULT_MAX_ENTRIES }

/// External agent process that serves chat queries and connection probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_command")]
    pub command: String,
    /// Extra arguments placed before the generated ones.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: Vec::new(),
            allowed_tools: default_allowed_tools(),
            max_turns: None,
        }
    }
}

fn default_agent_command() -> String { "claude".to_string() }
fn default_allowed_tools() -> Vec<String> {
    vec!["Read".to_string(), "Glob".to_string(), "Grep".to_string()]
}

/// How `/mcp list` and `/mcp test` obtain live connection status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    /// Read the handshake message of a minimal agent query.
    #[default]
    Agent,
    /// Perform the MCP initialize handshake directly.
    Handshake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub method: ProbeMethod,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_prompt")]
    pub prompt: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            method: ProbeMethod::default(),
            timeout_secs: default_probe_timeout(),
            prompt: default_probe_prompt(),
        }
    }
}

fn default_probe_timeout() -> u64 { 30 }
fn default_probe_prompt() -> String { "ping".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String { "tutor=info,warn".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TutorError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand::expand_str(&content, &expand::env_lookup);

        toml::from_str(&expanded).map_err(|e| TutorError::Config(e.to_string()))
    }

    /// Load `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the data directory (expand ~).
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.paths.data_dir)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.resolve(&self.paths.registry_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.resolve(&self.paths.history_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.paths.log_file)
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let path = expand_home(file);
        if path.is_absolute() {
            path
        } else {
            self.data_dir().join(path)
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
