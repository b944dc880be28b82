//! # Fleet Transport
//!
//! Transport layer implementations for agent/backend communication, with
//! runtime selection and fault-tolerant framing.
//!
//! ## Supported Transports
//!
//! - **STDIO**: for agents started as child processes of the coordinator
//! - **HTTP/SSE**: for remote agents connecting over the network
//! - **WebSocket**: for remote agents wanting a persistent duplex channel
//! - **Child process**: for supervising backend MCP servers spawned by the coordinator
//!
//! ## Module Organization
//!
//! ```text
//! fleetmcp-transport/
//! ├── core/           # Core transport traits and error types
//! ├── stdio/          # Standard I/O transport implementation
//! ├── http/           # HTTP/SSE transport implementation
//! ├── websocket/       # WebSocket transport implementation
//! ├── child_process/  # Backend process supervision transport
//! └── config/         # Predefined transport configurations
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,  // Error documentation in progress
    clippy::cast_possible_truncation,  // Intentional in metrics code
    clippy::must_use_candidate,  // Too pedantic for library APIs
    clippy::return_self_not_must_use,  // Constructor methods don't need must_use
    clippy::struct_excessive_bools,  // Sometimes bools are the right design
    clippy::missing_panics_doc,  // Panic docs added where genuinely needed
    clippy::default_trait_access  // Default::default() is sometimes clearer
)]

pub mod core;

#[cfg(feature = "stdio")]
pub mod stdio;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "websocket")]
pub mod websocket;

pub mod child_process;

pub mod config;

// Re-export core transport traits and types
pub use core::{
    Transport, TransportCapabilities, TransportConfig, TransportError, TransportEvent,
    TransportMessage, TransportMetrics, TransportResult, TransportState, TransportType,
};

// Re-export transport implementations
#[cfg(feature = "stdio")]
pub use stdio::StdioTransport;

#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportConfig, SseStream};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

// Re-export child process transport (always available)
pub use child_process::{ChildProcessConfig, ChildProcessTransport};

// Re-export utilities
pub use config::{Configs, TransportConfigBuilder};

/// Transport feature detection
#[derive(Debug)]
pub struct Features;

impl Features {
    /// Check if stdio transport is available
    #[must_use]
    pub const fn has_stdio() -> bool {
        cfg!(feature = "stdio")
    }

    /// Check if HTTP transport is available
    #[must_use]
    pub const fn has_http() -> bool {
        cfg!(feature = "http")
    }

    /// Check if WebSocket transport is available
    #[must_use]
    pub const fn has_websocket() -> bool {
        cfg!(feature = "websocket")
    }

    /// Check if child process transport is available (always true)
    #[must_use]
    pub const fn has_child_process() -> bool {
        true
    }

    /// Get list of available transport types
    #[must_use]
    pub fn available_transports() -> Vec<TransportType> {
        let mut transports = Vec::new();

        if Self::has_stdio() {
            transports.push(TransportType::Stdio);
        }
        if Self::has_http() {
            transports.push(TransportType::Http);
        }
        if Self::has_websocket() {
            transports.push(TransportType::WebSocket);
        }
        if Self::has_child_process() {
            transports.push(TransportType::ChildProcess);
        }

        transports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_detection() {
        let transports = Features::available_transports();
        assert!(
            !transports.is_empty(),
            "At least one transport should be available"
        );

        // stdio should always be available in default configuration
        assert!(Features::has_stdio());
    }
}
