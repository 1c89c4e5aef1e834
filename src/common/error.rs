use thiserror::Error;

/// Local validation failures; these never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("`{0}` is not an image")]
    NotAnImage(String),
    #[error("image payload is not a valid data URI")]
    InvalidDataUri,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// HTTP 401: the session has to be cleared and the user re-authenticated.
    #[error("session expired")]
    Unauthorized,
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("realtime connection error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("payload missing field `{0}`")]
    MissingField(&'static str),
    #[error("session cache error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("network task is not running")]
    Closed,
}

impl ChatError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ChatError::Unauthorized)
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
