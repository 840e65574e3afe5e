//! Client error types.

use std::time::Duration;

use http::Method;
use thiserror::Error;

use crate::api_error::ApiError;

/// Result type for API client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the request engine.
///
/// Rate-limit exhaustion and terminal server errors are not represented here:
/// those come back as ordinary [`Response`](crate::Response) values for the
/// caller to interpret.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Circuit breaker rejected the call before any transport attempt.
    #[error("circuit breaker is open: API server is experiencing issues")]
    CircuitOpen,

    /// Connection-level failure reported by `reqwest`.
    #[error("{method} {url} failed: {source}")]
    Transport {
        /// Request method.
        method: Method,
        /// Request URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Connection-level failure reported by a non-`reqwest` transport.
    #[error("{method} {url} failed: {message}")]
    TransportMessage {
        /// Request method.
        method: Method,
        /// Request URL.
        url: String,
        /// Failure description.
        message: String,
    },

    /// The caller cancelled the call.
    #[error("request cancelled")]
    Cancelled,

    /// The caller's deadline elapsed.
    #[error("request deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The body factory could not produce a body for an attempt.
    #[error("failed to replay request body: {0}")]
    BodyReplay(String),

    /// A JSON request body could not be encoded.
    #[error("failed to encode request body: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Base URL and path did not form a valid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Error envelope decoded from a non-success response.
    #[error("{method} {url} returned {status}: {source}")]
    Api {
        /// Request method.
        method: Method,
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Classified error body.
        #[source]
        source: ApiError,
    },

    /// A success body could not be decoded into the requested type.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// Invalid client configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Check if this is the synthetic circuit-open rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }

    /// Check if the caller's cancellation or deadline ended the call.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded(_))
    }

    /// Check if this is a connection-level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::TransportMessage { .. })
    }

    /// Get the HTTP status code if this error carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// An environment variable is set but could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// The assembled configuration failed validation.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// The HTTP transport could not be constructed.
    #[error("failed to build HTTP transport: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        assert!(ClientError::CircuitOpen.is_circuit_open());
        assert!(ClientError::Cancelled.is_cancellation());
        assert!(ClientError::DeadlineExceeded(Duration::from_secs(1)).is_cancellation());
        assert!(!ClientError::CircuitOpen.is_cancellation());

        let err = ClientError::TransportMessage {
            method: Method::GET,
            url: "https://api.dub.co/links".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(err.is_transport());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_api_error_message_carries_context() {
        let err = ClientError::Api {
            method: Method::DELETE,
            url: "https://api.dub.co/links/abc".to_string(),
            status: 404,
            source: ApiError::new("not_found", "Link not found"),
        };

        assert_eq!(err.status_code(), Some(404));
        assert_eq!(
            err.to_string(),
            "DELETE https://api.dub.co/links/abc returned 404: not_found: Link not found"
        );
    }

    #[test]
    fn test_config_error_wraps_transparently() {
        let err: ClientError = ConfigError::Missing("DUB_API_KEY").into();
        assert_eq!(err.to_string(), "missing required environment variable DUB_API_KEY");
    }
}
