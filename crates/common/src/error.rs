use std::time::Duration;

use thiserror::Error;

/// Failure talking to the control-plane API or the chat API.
///
/// Every variant carries the name of the operation that failed so log lines
/// can be traced back to the call site without a backtrace.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{operation}: request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation}: unexpected HTTP status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation}: could not decode response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The remote accepted the request but reported an application-level error.
    #[error("{operation}: API error: {code}")]
    Api { operation: &'static str, code: String },
}

impl RemoteError {
    pub fn transport(operation: &'static str, source: reqwest::Error) -> Self {
        RemoteError::Transport { operation, source }
    }

    pub fn decode(operation: &'static str, source: serde_json::Error) -> Self {
        RemoteError::Decode { operation, source }
    }

    /// The operation name this error was raised from.
    pub fn operation(&self) -> &'static str {
        match self {
            RemoteError::Transport { operation, .. }
            | RemoteError::Status { operation, .. }
            | RemoteError::Decode { operation, .. }
            | RemoteError::Api { operation, .. } => operation,
        }
    }

    /// HTTP status code, when the failure was a non-success response.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Missing or malformed startup configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Run-state cache failure. Logged, never fatal.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis command timed out after {0:?}")]
    Timeout(Duration),

    #[error("stored run state {value:?} is malformed: {source}")]
    Malformed {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}
