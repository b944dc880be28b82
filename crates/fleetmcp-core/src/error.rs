//! Narrow error taxonomy for leaf-level primitives (messages, state, retry).
//!
//! Higher crates define their own error types (`ProtocolError`,
//! `TransportError`, `CoordError`) and convert from `CoreError` via `#[from]`
//! rather than widening this one to cover every failure mode in the system.

use thiserror::Error;

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced by `fleetmcp-core` primitives.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Input failed a structural or semantic validation check.
    #[error("validation failed: {0}")]
    Validation(String),

    /// JSON encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation did not complete before its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Operation was cancelled by its caller.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Catch-all for conditions that should never occur in a correct build.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by callers deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller-supplied data is malformed; retrying without changes will fail again.
    Validation,
    /// Deadline was exceeded; retrying may succeed.
    Timeout,
    /// Caller cancelled the operation; do not retry.
    Cancelled,
    /// Unexpected internal condition.
    Internal,
}

impl CoreError {
    /// Classify this error for retry/backoff decisions.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Serialization(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Whether retrying this operation unchanged has a chance of succeeding.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout)
    }

    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Build a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Build a cancelled error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable_validation_is_not() {
        assert!(CoreError::timeout("deadline exceeded").is_retryable());
        assert!(!CoreError::validation("bad input").is_retryable());
    }

    #[test]
    fn serialization_errors_convert_via_from() {
        let err: CoreError = serde_json::from_str::<serde_json::Value>("{ not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, CoreError::Serialization(_)));
    }
}
