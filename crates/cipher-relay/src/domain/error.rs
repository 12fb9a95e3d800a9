//! Relay error types.
//!
//! `RelayError` covers everything a single request can fail with and maps to
//! an HTTP status. `ServiceError` covers process-level failures (startup,
//! socket binding) that never reach a client.

use crate::domain::ids::PendingId;
use axum::http::StatusCode;

/// Request-level errors, all recoverable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// `encrypted_message` absent, null, or empty
    #[error("No message provided")]
    MissingMessage,

    /// Body is not the expected JSON structure; carries the parser message
    #[error("{0}")]
    MalformedPayload(String),

    /// Pending identifier never existed, expired, or was already completed
    #[error("unknown or already completed pending request: {0}")]
    UnknownPendingIdentifier(PendingId),

    /// Pending identifier is not a valid UUID
    #[error("invalid pending identifier: {0}")]
    InvalidPendingIdentifier(String),

    /// Another client is already waiting on this pending request
    #[error("pending request {0} is already being awaited")]
    AlreadyAwaited(PendingId),

    /// Pending registry is at its configured cap
    #[error("too many pending requests (limit {capacity})")]
    RegistryFull { capacity: usize },

    /// Session store is at its configured cap
    #[error("too many active sessions (limit {capacity})")]
    SessionStoreFull { capacity: usize },
}

impl RelayError {
    /// HTTP status used when this error reaches a client
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingMessage | Self::MalformedPayload(_) | Self::InvalidPendingIdentifier(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UnknownPendingIdentifier(_) => StatusCode::NOT_FOUND,
            Self::AlreadyAwaited(_) => StatusCode::CONFLICT,
            Self::RegistryFull { .. } | Self::SessionStoreFull { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::MalformedPayload(e.to_string())
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Service-level errors (not sent to clients)
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Server I/O error while serving
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}
