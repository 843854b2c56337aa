use thiserror::Error;

/// Errors surfaced by the room, identity and summarizer layers.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No live connection to the room backend.
    #[error("room channel is not connected")]
    ChannelUnavailable,

    /// The backend refused the write (validation or permission).
    #[error("write rejected: {0}")]
    WriteRejected(String),

    #[error("anonymous sign-in failed: {0}")]
    AuthFailed(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },

    /// The text generator answered with an unexpected payload shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid preference: {0}")]
    InvalidPreference(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    /// A blocking or spawned task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Http(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
