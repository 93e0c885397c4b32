//! Error types for remote capabilities and change detection.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Result type for calls against the remote system.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for change detection.
pub type PollResult<T> = Result<T, PollError>;

/// Errors raised by a remote query or apply capability.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// Network failure before the request reached the remote system.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// Whether the call can be retried.
        retryable: bool,
    },

    /// The call did not complete within its timeout.
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The connection dropped after the request was sent.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The remote system is throttling requests.
    #[error("rate limited")]
    RateLimited {
        /// Hint from the remote system, if any.
        retry_after: Option<Duration>,
    },

    /// The remote system reported an internal failure.
    #[error("server error: {0}")]
    ServerError(String),

    /// The request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Creates a retryable network error.
    pub fn network_retryable(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable network error.
    pub fn network_fatal(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network { retryable, .. } => *retryable,
            RemoteError::Timeout(_)
            | RemoteError::ConnectionLost(_)
            | RemoteError::RateLimited { .. }
            | RemoteError::ServerError(_) => true,
            RemoteError::AuthenticationFailed(_) | RemoteError::InvalidRequest(_) => false,
        }
    }

    /// Returns true if the remote side may have applied the request even
    /// though the call failed.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, RemoteError::Timeout(_) | RemoteError::ConnectionLost(_))
    }
}

/// Errors raised while detecting changed records.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    /// The window ends before it starts.
    #[error("invalid change window: start {start} is after end {end}")]
    InvalidWindow {
        /// Window start.
        start: DateTime<Utc>,
        /// Window end.
        end: DateTime<Utc>,
    },

    /// The remote query failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl PollError {
    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            PollError::InvalidWindow { .. } => false,
            PollError::Remote(err) => err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(RemoteError::network_retryable("connection refused").is_retryable());
        assert!(!RemoteError::network_fatal("bad certificate").is_retryable());
        assert!(RemoteError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(RemoteError::RateLimited { retry_after: None }.is_retryable());
        assert!(!RemoteError::AuthenticationFailed("expired".into()).is_retryable());
    }

    #[test]
    fn unknown_outcome_errors() {
        assert!(RemoteError::Timeout(Duration::from_secs(1)).is_outcome_unknown());
        assert!(RemoteError::ConnectionLost("reset".into()).is_outcome_unknown());
        assert!(!RemoteError::network_retryable("refused").is_outcome_unknown());
        assert!(!RemoteError::ServerError("500".into()).is_outcome_unknown());
    }

    #[test]
    fn poll_error_passes_remote_message_through() {
        let err = PollError::from(RemoteError::AuthenticationFailed("expired".into()));
        assert_eq!(err.to_string(), "authentication failed: expired");
        assert!(!err.is_retryable());
    }
}
