//! # fleetmcp-core
//!
//! Foundation crate for the fleetmcp coordination proxy: shared error taxonomy,
//! wire-adjacent value types, a generic component registry, and the retry /
//! circuit-breaker primitives the backend supervisor builds on.
//!
//! ## Architecture
//!
//! ```text
//! fleetmcp-core/
//! ├── error/          # CoreError taxonomy and conversions
//! ├── message/        # Envelope types used below the JSON-RPC layer
//! ├── types/          # Timestamp, ProtocolVersion, ContentType
//! ├── context/         # Request context and client-id extraction
//! ├── registry/       # Generic type-erased component registry
//! ├── state/          # Lightweight in-memory key/value state
//! └── utils/          # Timeout, retry-with-backoff, circuit breaker
//! ```
//!
//! This crate is the dependency-order leaf: `fleetmcp-protocol`,
//! `fleetmcp-transport`, and `fleetmcp-coordinator` all build on it.

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
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::struct_excessive_bools,
    clippy::missing_panics_doc,
    clippy::default_trait_access,
    clippy::significant_drop_tightening,
    clippy::used_underscore_binding
)]

pub mod context;
pub mod error;
pub mod error_utils;
pub mod message;
pub mod registry;
pub mod state;
pub mod types;
pub mod utils;

pub use context::{ClientId, ClientIdExtractor, RequestContext};
pub use error::{CoreError, ErrorKind, Result};
pub use message::{Message, MessageId, MessageMetadata};
pub use state::StateManager;
pub use types::{ContentType, ProtocolVersion, Timestamp};

/// Default MCP wire protocol version advertised during `initialize`.
///
/// Overridable via coordinator configuration; this is the fallback when no
/// override is configured.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol versions the coordinator can negotiate down to.
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Maximum accepted JSON-RPC message size, in bytes, across every transport.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default per-request timeout in milliseconds, absent a more specific one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Build version of this crate, surfaced in the `version` CLI subcommand.
pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_versions_contains_default() {
        assert!(SUPPORTED_VERSIONS.contains(&PROTOCOL_VERSION));
    }

    #[test]
    fn size_and_timeout_constants_are_sane() {
        const _: () = assert!(MAX_MESSAGE_SIZE == 16 * 1024 * 1024);
        const _: () = assert!(DEFAULT_TIMEOUT_MS == 30_000);
    }
}
