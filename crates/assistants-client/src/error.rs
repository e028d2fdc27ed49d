//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a blocking response body failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error code from server.
        code: String,
        /// Error message from server.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stream error.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Failure reported by a caller-supplied transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A page or rehydration token could not be decoded.
    #[error("Invalid token format: {0}")]
    Format(String),

    /// The operation is not in a state that allows the call.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The event stream ended before the run reached a terminal status.
    #[error(
        "Event stream ended without completing (last status: {}); wait for a status change instead",
        last_status.as_deref().unwrap_or("unknown")
    )]
    IncompleteStream {
        /// Last status observed before the stream ended.
        last_status: Option<String>,
    },

    /// The caller cancelled the wait.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_)) || matches!(self, Error::Api { status: 401, .. })
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::Api { status: 429, .. })
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    /// Check if this error came from the request primitive rather than
    /// from paging or operation bookkeeping.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::Io(_)
                | Error::Transport(_)
                | Error::Api { .. }
                | Error::Auth(_)
                | Error::NotFound(_)
        )
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error envelope returned by the server.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorBody,
}

/// Body of the server error envelope.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}
