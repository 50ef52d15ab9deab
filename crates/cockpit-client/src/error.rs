//! Error types for cockpit client operations

use thiserror::Error;

/// Result type alias for cockpit operations
pub type Result<T> = std::result::Result<T, OperationError>;

/// Failure of a single operation against the backend.
///
/// Carries an opaque message: either the backend's raw error body or a
/// description of the transport failure. Network errors, timeouts,
/// malformed payloads and business errors all collapse into this one type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct OperationError {
    message: String,
}

impl OperationError {
    /// Create an error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Create an error from a failed reqwest call
    pub fn from_transport(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }

    /// The opaque error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for OperationError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_transport(err)
    }
}

/// Errors that can occur while constructing a client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Invalid base URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (binding a test server)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
