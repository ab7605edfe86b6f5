//! Session error types.

use thiserror::Error;

use crate::protocol::DecodeError;
use crate::session::state::CloseReason;

/// Errors raised by session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session is closing or closed; the client must start a new one.
    #[error("session closed ({} {})", .0.code, .0.reason)]
    Closed(CloseReason),

    /// A client batch could not be decoded. The session is unaffected.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Outcome of an `xhr_send` request that was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("session not found")]
    SessionNotFound,

    #[error("payload expected")]
    EmptyPayload,

    #[error("broken JSON encoding")]
    InvalidEncoding,
}

impl SendError {
    /// Label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            SendError::SessionNotFound => "not_found",
            SendError::EmptyPayload => "empty_payload",
            SendError::InvalidEncoding => "invalid_encoding",
        }
    }
}

impl From<SessionError> for SendError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Closed(_) => SendError::SessionNotFound,
            SessionError::Decode(DecodeError::EmptyPayload) => SendError::EmptyPayload,
            SessionError::Decode(DecodeError::InvalidEncoding(_)) => SendError::InvalidEncoding,
        }
    }
}
