//! Relay error types.

use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Session data missing a required field
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Identity provider reported an error
    #[error("{0}")]
    Provider(String),

    /// Extension messaging failed or no extension is listening
    #[error("Extension messaging failed: {0}")]
    Extension(String),

    /// In-page message could not be posted
    #[error("Page messaging failed: {0}")]
    Messaging(String),

    /// Invalid input supplied by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid state transition in the callback FSM
    #[error("Invalid callback state transition: {0}")]
    InvalidStateTransition(String),

    /// Page storage error
    #[error("Storage error: {0}")]
    Storage(#[from] relay_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Provider did not answer within the allotted time
    #[error("Operation timed out")]
    Timeout,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Whether a later poll cycle may succeed where this one failed.
    ///
    /// Slow providers, connection failures and 5xx responses are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::Timeout => true,
            RelayError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Message suitable for a user-visible notice.
    pub fn user_message(&self) -> Option<String> {
        match self {
            RelayError::Provider(message) if !message.trim().is_empty() => {
                Some(message.clone())
            }
            _ => None,
        }
    }
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
