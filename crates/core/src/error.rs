//! Error types for the knbridge core

use thiserror::Error;

/// Result type alias for knbridge core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while bridging CloudEvents over HTTP
///
/// A request that matches no consumer is not an error; see
/// [`RouteMatch::NoMatch`](crate::routing::RouteMatch::NoMatch).
#[derive(Debug, Error)]
pub enum Error {
    /// Local validation failure (missing body, undefined host).
    ///
    /// Never retried and always raised before any network I/O.
    #[error("{0}")]
    Validation(String),

    /// Malformed or incompatible envelope
    #[error("Invalid CloudEvent: {0}")]
    Decode(String),

    /// A downstream hop answered with a non-2xx status
    #[error("HTTP operation failed invoking {url} with statusCode: {status_code}, statusMessage: {status_text}")]
    RemoteInvocation {
        /// Target URL of the failed request
        url: String,
        /// HTTP status code returned by the remote
        status_code: u16,
        /// Canonical reason phrase of the status
        status_text: String,
        /// Response body, if any
        body: String,
    },

    /// A consumer callback failed while processing an envelope
    #[error("{0}")]
    Consumer(String),

    /// Configuration error (environment descriptors, endpoint URIs)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport error (connection refused, timeouts, I/O on the wire)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build the validation error raised for a send without a body
    pub fn missing_body() -> Self {
        Error::Validation("body must not be null".to_string())
    }

    /// Build the validation error raised for a target without host or URL
    pub fn undefined_host(target: &str) -> Self {
        Error::Validation(format!(
            "HTTP operation failed because host is not defined (target: {})",
            target
        ))
    }

    /// Whether this error was raised locally before any network I/O
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Whether this error reports a non-2xx answer from a remote hop
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::RemoteInvocation { .. })
    }

    /// HTTP status carried by a remote invocation failure
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::RemoteInvocation { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}
