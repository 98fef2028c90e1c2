//! Error types for the pooled client.

use std::time::Duration;
use thiserror::Error;

/// Boxed source error from the underlying transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while issuing a request through `WebClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, DNS or TLS failure, broken connection.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response declared a JSON content type but the body is not valid JSON.
    #[error("failed to decode JSON body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request payload could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// The underlying library refused to build a connection pool.
    #[error("failed to construct connection pool: {0}")]
    PoolConstruction(String),

    /// No pool was reachable after opening the session.
    #[error("client session is not available")]
    SessionUnavailable,

    /// The pool was torn down while the request was waiting for a connection.
    #[error("connection pool is closed")]
    PoolClosed,

    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
}

impl ClientError {
    /// Wrap any transport-level failure.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        ClientError::Transport(err.into())
    }

    /// Return true if this error is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
