//! HTTP transport error types

use thiserror::Error;

/// HTTP transport error types
#[derive(Debug, Error)]
pub enum Error {
    /// Server could not bind or stopped with an error
    #[error("Server error: {0}")]
    ServerError(String),

    /// HTTP client could not be created
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error raised by the bridge core (validation, decode, remote invocation, ...)
    #[error(transparent)]
    Core(#[from] knbridge_core::Error),
}

impl From<Error> for knbridge_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(inner) => inner,
            other => knbridge_core::Error::Transport(other.to_string()),
        }
    }
}

/// Result type for HTTP transport operations
pub type Result<T> = std::result::Result<T, Error>;
