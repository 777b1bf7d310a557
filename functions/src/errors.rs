use crate::config::ValidationError;
use queue::QueueError;
use thiserror::Error;

/// Result type alias for function host operations
pub type Result<T, E = FunctionError> = std::result::Result<T, E>;

/// Errors raised by functions and by the host around them.
///
/// Functions never translate these themselves: the host turns an HTTP
/// function error into a 500 and a queue function error into an abandon.
#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("dependency {url} unavailable: {reason}")]
    DependencyUnavailable { url: String, reason: String },

    #[error("failed to enqueue message: {0}")]
    EnqueueFailed(#[source] QueueError),

    #[error("consumer fault: {0}")]
    ConsumerFault(String),

    #[error("request URL does not contain the /{prefix}/ route prefix")]
    MissingRoutePrefix { prefix: String },

    #[error("invalid request URL: {0}")]
    InvalidRequestUrl(String),

    #[error("function {function} timed out after {timeout_secs}s")]
    FunctionTimeout { function: String, timeout_secs: u64 },

    #[error("app setting {0} is not defined")]
    MissingSetting(String),

    #[error("invalid binding expression: {0}")]
    InvalidBindingExpression(String),

    #[error("function {0} is registered more than once")]
    DuplicateFunction(String),

    #[error("could not build HTTP client: {0}")]
    HttpClientBuild(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FunctionError {
    /// Short outcome tag used in metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FunctionError::DependencyUnavailable { .. } => "dependency_unavailable",
            FunctionError::EnqueueFailed(_) => "enqueue_failed",
            FunctionError::ConsumerFault(_) => "consumer_fault",
            FunctionError::FunctionTimeout { .. } => "timeout",
            _ => "error",
        }
    }
}
