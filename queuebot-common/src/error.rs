// ================================================================
// File: queuebot-common/src/error.rs
// ================================================================

use thiserror::Error;

/// Expected, user-facing queue conditions. The `Display` text of each
/// variant is exactly what ends up in chat.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue system is currently disabled.")]
    QueueDisabled,

    #[error("Queue system is currently paused.")]
    QueuePaused,

    #[error("{0} is already in the queue!")]
    AlreadyInQueue(String),

    #[error("Queue is empty.")]
    QueueEmpty,

    #[error("{0} is not in the queue!")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("You don't have permission to use this command.")]
    PermissionDenied,

    #[error("Queue state channel mismatch: expected {expected}, got {found}")]
    ChannelMismatch { expected: String, found: String },

    #[error("Queue system is already paused.")]
    AlreadyPaused,

    #[error("Queue system is not paused.")]
    NotPaused,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Command '{0}' is already registered")]
    DuplicateCommand(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

impl Error {
    /// Text suitable for a chat reply. Queue conditions render without the
    /// "Queue error:" prefix; everything else keeps its full description.
    pub fn user_message(&self) -> String {
        match self {
            Error::Queue(q) => q.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}
