use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirError {
    #[error("Fetch failed ({stream}): {reason}")]
    FetchFailed { stream: String, reason: String },

    #[error("Composer not found: {0}")]
    KeyNotFound(String),

    #[error("Composer is read-only: {0}")]
    ReadOnly(String),

    #[error("Unknown fetch ticket: {0}")]
    UnknownTicket(u64),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] confique::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DirError>;
