//! # Agent Coordinator
//!
//! A multi-agent MCP coordination proxy. Agents register over a session,
//! pull tasks from a shared Task Registry, and call tools that are either
//! handled natively (registration, task board, locks, codebase status) or
//! forwarded to one of several supervised external MCP servers.
//!
//! ## Features
//!
//! - **Session Manager** - token-bearing sessions with TTL sweep and revocation
//! - **Agent Registry** - capability-tagged agent bookkeeping and staleness detection
//! - **Task Registry** - FIFO task queue with auto-generated fallback tasks
//! - **External Server Supervisor** - spawns, health-checks, and restarts backend MCP servers
//! - **Tool Filter** - local vs. remote tool-surface policy
//! - **Event Log** - append-only audit trail behind the registries
//! - **Multi-Transport** - stdio, HTTP/SSE, and WebSocket, selectable at runtime
//!
//! ## Example
//!
//! ```no_run
//! use fleetmcp_coordinator::config::CoordinatorConfig;
//! use fleetmcp_coordinator::server::CoordinatorServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoordinatorConfig::load(None)?;
//!     let server = CoordinatorServer::new(config).await?;
//!     let shutdown_handle = server.shutdown_handle();
//!     // tokio::spawn(async move { server.run().await });
//!     // tokio::signal::ctrl_c().await?;
//!     // shutdown_handle.shutdown().await;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::struct_excessive_bools,
    clippy::missing_panics_doc,
    clippy::default_trait_access
)]

/// Server name advertised in `initialize` and the `Server` response header.
pub const SERVER_NAME: &str = "AgentCoordinator";
/// Server version advertised in `initialize`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod agents;
pub mod backends;
pub mod codebases;
pub mod config;
pub mod error;
pub mod event_log;
pub mod filter;
pub mod handlers;
pub mod inbox;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod tasks;

pub use config::CoordinatorConfig;
pub use error::{CoordError, ServerResult};
pub use handlers::CoordinatorState;
pub use lifecycle::{HealthStatus, ServerLifecycle};
pub use metrics::{MetricsCollector, ServerMetrics};
pub use registry::ToolRegistry;
pub use router::Router;
pub use server::{CoordinatorServer, ShutdownHandle};

pub use fleetmcp_protocol::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JsonRpcVersion};
pub use fleetmcp_protocol::types::{CallToolRequest, CallToolResult, ListToolsResult, Tool};
pub use fleetmcp_protocol::types::{ClientCapabilities, ServerCapabilities};

pub use fleetmcp_core::context::{ClientId, ClientIdExtractor, RequestContext};

/// Default coordinator configuration.
#[must_use]
pub fn default_config() -> CoordinatorConfig {
    CoordinatorConfig::default()
}
