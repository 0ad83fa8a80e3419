//! Client error types

use thiserror::Error;

/// Result alias used throughout the client
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// The identity endpoint answered with a non-2xx status
    #[error("Authentication failed: identity endpoint returned {status}")]
    AuthenticationFailed { status: u16 },

    /// The identity endpoint answered 2xx but carried no usable credential
    #[error("No token found in authentication response")]
    MissingToken,

    /// The identity endpoint answered 2xx but carried no expiry
    #[error("No expiry found in authentication response")]
    MissingExpiry,

    /// The request still failed after re-authenticating once
    #[error("Retry failed: {status} - {body}")]
    RetryFailed { status: u16, body: String },

    /// Server returned an error status
    #[error("{message}")]
    Api { status: u16, message: String },

    /// A 2xx response whose body was not the JSON we expected
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Caller supplied a header name or value that is not valid HTTP
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Persistent storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A submission is already in flight for this form
    #[error("A submission is already in progress")]
    SubmissionInFlight,
}

impl ClientError {
    /// HTTP status code carried by the error, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationFailed { status }
            | Self::RetryFailed { status, .. }
            | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the error came out of the authentication handshake
    pub const fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::MissingToken | Self::MissingExpiry
        )
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
