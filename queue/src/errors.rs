use crate::types::LockToken;

/// Result type alias for queue operations
pub type Result<T, E = QueueError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("queue name must not be empty")]
    InvalidQueueName,

    #[error("lock {0} was lost or has expired")]
    LockLost(LockToken),

    #[error("invalid connection: {0}")]
    InvalidConnection(String),

    #[error("queue service returned unexpected status {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    #[error("could not decode message from queue service: {0}")]
    Decode(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
