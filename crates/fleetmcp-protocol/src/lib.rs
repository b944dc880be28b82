//! # MCP Protocol Implementation
//!
//! Wire types and JSON-RPC framing for the `initialize` / `tools/list` /
//! `tools/call` surface the coordinator exposes to agents. This crate does
//! not implement prompts, resources, sampling, roots, or logging: the
//! coordinator's native tool catalog is the only surface agents call.
//!
//! ## Features
//!
//! - JSON-RPC 2.0 support with batching
//! - Type-safe capability negotiation over the tools-only surface
//! - Protocol version negotiation
//! - JSON Schema validation of tool inputs

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,  // Error documentation in progress
    clippy::wildcard_imports,  // Used in test modules
    clippy::must_use_candidate,  // Too pedantic for library APIs
    clippy::return_self_not_must_use,  // Constructor methods don't need must_use
    clippy::struct_excessive_bools,  // Sometimes bools are the right design
    clippy::missing_panics_doc,  // Panic docs added where genuinely needed
    clippy::default_trait_access  // Default::default() is sometimes clearer
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Re-export core functionality
pub use fleetmcp_core::{CoreError, Result};

// Core protocol modules
pub mod capabilities;
pub mod jsonrpc;
pub mod types;
pub mod validation;
pub mod versioning;

// Re-export commonly used types
pub use types::{
    BaseMetadata,
    CallToolRequest,
    CallToolResult,
    // Capability types
    ClientCapabilities,
    // Content types
    ContentBlock,
    Implementation,
    InitializeRequest,
    InitializeResult,
    InitializedNotification,
    ListToolsRequest,
    ListToolsResult,
    ProtocolVersion,
    RequestId,
    ServerCapabilities,
    // Tool types
    Tool,
    ToolAnnotations,
    ToolInputSchema,
    ToolsCapabilities,
};

pub use jsonrpc::{
    JsonRpcBatch, JsonRpcError, JsonRpcErrorCode, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcVersion,
};

pub use capabilities::{CapabilityMatcher, CapabilityNegotiator, CapabilitySet};

pub use versioning::{VersionCompatibility, VersionManager, VersionRequirement};

/// Current MCP protocol version
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Supported MCP protocol versions
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2024-11-05"];

/// Protocol feature flags
pub mod features {
    /// Tool calling capability
    pub const TOOLS: &str = "tools";
}

/// Protocol method names
pub mod methods {
    /// Initialize handshake method
    pub const INITIALIZE: &str = "initialize";
    /// Initialized notification method
    pub const INITIALIZED: &str = "notifications/initialized";
    /// List available tools method
    pub const LIST_TOOLS: &str = "tools/list";
    /// Call a specific tool method
    pub const CALL_TOOL: &str = "tools/call";
}

/// Protocol error codes: JSON-RPC standard plus the coordinator's
/// application-defined range used by `CoordError::jsonrpc_error_code`.
pub mod error_codes {
    /// Parse error - Invalid JSON was received by the server
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request - The JSON sent is not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The method does not exist / is not available
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - Invalid method parameter(s)
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Caller is not authenticated (missing or invalid session token)
    pub const UNAUTHENTICATED: i32 = -32001;
    /// Referenced tool name is not in the catalog. Spec-mandated alias of
    /// `METHOD_NOT_FOUND` (an unknown tool is, on this wire surface, a
    /// method the server does not expose), not a distinct application code.
    pub const UNKNOWN_TOOL: i32 = METHOD_NOT_FOUND;
    /// Referenced agent, task, or codebase id does not exist
    pub const UNKNOWN_ENTITY: i32 = -32003;
    /// Requested state transition is not legal from the entity's current state
    pub const INVALID_TRANSITION: i32 = -32004;
    /// File lock is already held by another task
    pub const LOCK_CONFLICT: i32 = -32005;
    /// Backend MCP server did not respond before its deadline
    pub const BACKEND_TIMEOUT: i32 = -32006;
    /// Backend MCP server rejected the call as overloaded
    pub const BACKEND_OVERLOADED: i32 = -32007;
    /// Backend MCP server process is not running
    pub const BACKEND_DEAD: i32 = -32008;
    /// Event log is temporarily unavailable
    pub const LOG_UNAVAILABLE: i32 = -32009;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_constants() {
        assert_eq!(PROTOCOL_VERSION, "2025-06-18");
        assert!(SUPPORTED_VERSIONS.contains(&PROTOCOL_VERSION));
        #[allow(clippy::const_is_empty)]
        {
            assert!(!SUPPORTED_VERSIONS.is_empty());
        }
    }

    #[test]
    fn test_method_names() {
        assert_eq!(methods::INITIALIZE, "initialize");
        assert_eq!(methods::LIST_TOOLS, "tools/list");
        assert_eq!(methods::CALL_TOOL, "tools/call");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(error_codes::PARSE_ERROR, -32700);
        assert_eq!(error_codes::UNKNOWN_TOOL, -32601);
    }
}
