use thiserror::Error;

#[derive(Debug, Error)]
pub enum TutorError {
    // Registry errors
    #[error("Server `{0}` already exists")]
    DuplicateName(String),

    #[error("Server name must not be empty")]
    EmptyName,

    #[error("Invalid type `{0}`. Must be stdio, sse, or http.")]
    InvalidKind(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Agent stream errors
    #[error("Agent error: {0}")]
    Agent(String),

    // MCP errors
    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Cancelled")]
    Cancelled,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TutorError>;
