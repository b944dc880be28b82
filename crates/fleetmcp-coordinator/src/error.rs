//! Coordinator error taxonomy and JSON-RPC error code mapping.

use fleetmcp_protocol::error_codes;

/// Result type for coordinator operations.
pub type ServerResult<T> = Result<T, CoordError>;

/// Coordinator-wide error type. Every taxonomy bucket in the error handling
/// design maps to one variant; `error_code` performs the JSON-RPC mapping,
/// `is_retryable`/`is_fatal` classify variants for the Router and Supervisor.
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    /// Malformed JSON-RPC envelope (parse / invalid-request / invalid-params).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Arguments failed JSON Schema validation against the tool's declared schema.
    #[error("invalid params for {tool}: {message}")]
    InvalidParams {
        /// Tool the arguments were validated against.
        tool: String,
        /// Validation failure detail.
        message: String,
    },

    /// No session token presented on an authenticated method.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Session token presented but past its `expires_at`.
    #[error("session expired")]
    SessionExpired,

    /// Session token presented but explicitly revoked.
    #[error("session revoked")]
    SessionRevoked,

    /// `tools/call` named a tool not present in the aggregated catalog.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Referenced agent id has no corresponding registry entry.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// Referenced task id has no corresponding registry entry.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// Referenced codebase id has no corresponding registry entry.
    #[error("unknown codebase: {0}")]
    UnknownCodebase(String),

    /// Requested state transition is not legal from the entity's current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Candidate agent's capability set does not cover a task's requirements.
    #[error("capability mismatch: {0}")]
    CapabilityMismatch(String),

    /// A file path in the task is already locked by another in-progress task.
    #[error("lock conflict on {path} (held by task {holder})")]
    LockConflict {
        /// Path that is already locked.
        path: String,
        /// Task id currently holding the lock.
        holder: String,
    },

    /// A backend did not answer a multiplexed request before its deadline.
    #[error("backend {backend} timed out")]
    BackendTimeout {
        /// Backend name.
        backend: String,
    },

    /// A backend's pending-response map is at capacity.
    #[error("backend {backend} overloaded")]
    BackendOverloaded {
        /// Backend name.
        backend: String,
    },

    /// A backend has exhausted its restart attempts or has no running process.
    #[error("backend {backend} is dead")]
    BackendDead {
        /// Backend name.
        backend: String,
    },

    /// The Event Log did not durably acknowledge a write within its bounded
    /// retry budget. In-memory state keeps serving reads.
    #[error("event log unavailable: {0}")]
    LogUnavailable(String),

    /// Startup-only failure (bad config, unable to bind) that exits the process.
    #[error("fatal: {0}")]
    Fatal(String),

    /// Lower-layer error converted at the crate boundary.
    #[error("core error: {0}")]
    Core(#[from] fleetmcp_core::CoreError),

    /// Transport-layer error converted at the crate boundary.
    #[error("transport error: {0}")]
    Transport(#[from] fleetmcp_transport::TransportError),

    /// JSON (de)serialization failure outside the request envelope itself.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for conditions with no more specific bucket.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordError {
    /// Build an [`CoordError::InvalidParams`].
    pub fn invalid_params(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Build a [`CoordError::LockConflict`].
    pub fn lock_conflict(path: impl Into<String>, holder: impl Into<String>) -> Self {
        Self::LockConflict {
            path: path.into(),
            holder: holder.into(),
        }
    }

    /// Build a [`CoordError::BackendTimeout`].
    pub fn backend_timeout(backend: impl Into<String>) -> Self {
        Self::BackendTimeout {
            backend: backend.into(),
        }
    }

    /// Build a [`CoordError::BackendOverloaded`].
    pub fn backend_overloaded(backend: impl Into<String>) -> Self {
        Self::BackendOverloaded {
            backend: backend.into(),
        }
    }

    /// Build a [`CoordError::BackendDead`].
    pub fn backend_dead(backend: impl Into<String>) -> Self {
        Self::BackendDead {
            backend: backend.into(),
        }
    }

    /// Build a [`CoordError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Build a [`CoordError::Fatal`].
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Whether the caller may usefully retry the request as-is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BackendTimeout { .. } | Self::BackendOverloaded { .. } | Self::LogUnavailable(_)
        )
    }

    /// Whether this error should terminate the process (startup-only).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Map to the JSON-RPC error code the error taxonomy assigns this variant.
    #[must_use]
    pub const fn error_code(&self) -> i32 {
        match self {
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::InvalidParams { .. } => error_codes::INVALID_PARAMS,
            Self::Unauthenticated | Self::SessionExpired | Self::SessionRevoked => {
                error_codes::UNAUTHENTICATED
            }
            Self::UnknownTool(_) => error_codes::UNKNOWN_TOOL,
            Self::UnknownAgent(_) | Self::UnknownTask(_) | Self::UnknownCodebase(_) => {
                error_codes::UNKNOWN_ENTITY
            }
            Self::InvalidTransition(_) => error_codes::INVALID_TRANSITION,
            Self::CapabilityMismatch(_) | Self::LockConflict { .. } => {
                error_codes::LOCK_CONFLICT
            }
            Self::BackendTimeout { .. } => error_codes::BACKEND_TIMEOUT,
            Self::BackendOverloaded { .. } => error_codes::BACKEND_OVERLOADED,
            Self::BackendDead { .. } => error_codes::BACKEND_DEAD,
            Self::LogUnavailable(_) => error_codes::LOG_UNAVAILABLE,
            Self::Core(_) | Self::Transport(_) | Self::Serialization(_) | Self::Internal(_) => {
                error_codes::INTERNAL_ERROR
            }
            Self::Fatal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Convert to a JSON-RPC error object ready to embed in a response.
    #[must_use]
    pub fn to_jsonrpc_error(&self) -> fleetmcp_protocol::jsonrpc::JsonRpcError {
        fleetmcp_protocol::jsonrpc::JsonRpcError {
            code: self.error_code(),
            message: self.to_string(),
            data: None,
        }
    }
}

/// Error context for audit/log records attached to a Event Log entry.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Error category, e.g. `"session"`, `"task"`, `"backend"`.
    pub category: String,
    /// Operation being performed when the error occurred.
    pub operation: String,
    /// Request id, if the error occurred while handling a request.
    pub request_id: Option<String>,
    /// Client id, if known.
    pub client_id: Option<String>,
    /// Additional free-form metadata.
    pub metadata: std::collections::HashMap<String, String>,
}

impl ErrorContext {
    /// Create a new error context.
    pub fn new(category: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            operation: operation.into(),
            request_id: None,
            client_id: None,
            metadata: std::collections::HashMap::new(),
        }
    }

    /// Attach a request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach a client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Attach a metadata key/value pair.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_maps_to_method_not_found() {
        let err = CoordError::UnknownTool("bogus".to_string());
        assert_eq!(err.error_code(), -32601);
    }

    #[test]
    fn unauthenticated_variants_map_to_auth_code() {
        assert_eq!(CoordError::Unauthenticated.error_code(), -32001);
        assert_eq!(CoordError::SessionExpired.error_code(), -32001);
        assert_eq!(CoordError::SessionRevoked.error_code(), -32001);
    }

    #[test]
    fn backend_errors_are_retryable_but_not_fatal() {
        let err = CoordError::backend_timeout("mem");
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn fatal_error_is_not_retryable() {
        let err = CoordError::fatal("bind failed");
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }
}
