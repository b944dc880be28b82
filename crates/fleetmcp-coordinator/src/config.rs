//! Coordinator configuration: layered load (defaults → file → environment).
//!
//! Mirrors the teacher's `ServerConfig` shape — bind address/ports,
//! timeouts, logging — trimmed of the enterprise security knobs that have
//! no counterpart here, plus the coordinator-specific sections
//! (`external_servers`, `session`, `task`, `event_log`). Built with the
//! `config` crate's layered `Config::builder()`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backends::BackendConfig;
use crate::error::{CoordError, ServerResult};

/// Which transport surfaces the coordinator listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceMode {
    /// stdio only (the coordinator is launched as a child process itself).
    Stdio,
    /// HTTP/SSE only.
    Http,
    /// WebSocket only.
    Websocket,
    /// HTTP and WebSocket, no stdio.
    Remote,
    /// stdio, HTTP, and WebSocket all at once.
    All,
}

impl InterfaceMode {
    /// Whether this mode brings up the stdio transport.
    #[must_use]
    pub const fn wants_stdio(self) -> bool {
        matches!(self, Self::Stdio | Self::All)
    }

    /// Whether this mode brings up the HTTP transport.
    #[must_use]
    pub const fn wants_http(self) -> bool {
        matches!(self, Self::Http | Self::Remote | Self::All)
    }

    /// Whether this mode brings up the WebSocket transport.
    #[must_use]
    pub const fn wants_websocket(self) -> bool {
        matches!(self, Self::Websocket | Self::Remote | Self::All)
    }
}

/// Top-level coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Server name advertised in `initialize`.
    pub name: String,
    /// Server semver advertised in `initialize`.
    pub version: String,
    /// Which transports to bring up.
    pub interface_mode: InterfaceMode,
    /// Address HTTP/WS bind to.
    pub bind_address: String,
    /// HTTP port.
    pub http_port: u16,
    /// WebSocket port.
    pub ws_port: u16,
    /// Session Manager settings.
    pub session: SessionConfig,
    /// Task Registry settings.
    pub task: TaskConfig,
    /// Event Log backend settings.
    pub event_log: EventLogConfig,
    /// Backends to spawn at startup, keyed by logical name.
    pub external_servers: HashMap<String, BackendConfig>,
    /// Logging output settings.
    pub logging: LoggingConfig,
    /// Whether the `/metrics` Prometheus endpoint is exposed on the HTTP transport.
    pub metrics_enabled: bool,
}

/// Session Manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default session lifetime before `validate` reports `Expired`.
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    /// Interval between expired-session sweeps.
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Task Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// How long an agent may go without a heartbeat before it is considered
    /// stale and its in-progress task is retried.
    #[serde(with = "duration_secs")]
    pub stale_threshold: Duration,
    /// Completed tasks retained per codebase for `get_task_board`.
    pub board_retention: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            stale_threshold: Duration::from_secs(90),
            board_retention: 200,
        }
    }
}

/// Event Log backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum EventLogConfig {
    /// Process-local, non-durable. Default; suitable for single-instance deployments.
    Memory,
    /// NATS JetStream-backed, for durable cross-restart replay.
    Nats {
        /// NATS server host.
        host: String,
        /// NATS server port.
        port: u16,
    },
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Logging output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `pretty` (human-readable) or `json` (structured).
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `"info"` or `"fleetmcp_coordinator=debug,info"`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: "info".to_string(),
        }
    }
}

/// Log rendering format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, colorized when the terminal supports it.
    Pretty,
    /// One JSON object per line, for log aggregators.
    Json,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            name: "AgentCoordinator".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            interface_mode: InterfaceMode::All,
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            ws_port: 8081,
            session: SessionConfig::default(),
            task: TaskConfig::default(),
            event_log: EventLogConfig::default(),
            external_servers: HashMap::new(),
            logging: LoggingConfig::default(),
            metrics_enabled: false,
        }
    }
}

impl CoordinatorConfig {
    /// Load the layered configuration: built-in defaults → optional config
    /// file → environment variables. `config_path` is typically sourced
    /// from a `--config` CLI flag; falls back to `FLEETMCP_CONFIG` if unset.
    pub fn load(config_path: Option<&Path>) -> ServerResult<Self> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("name", defaults.name.clone())
            .map_err(config_err)?
            .set_default("interface_mode", "all")
            .map_err(config_err)?
            .set_default("bind_address", defaults.bind_address.clone())
            .map_err(config_err)?
            .set_default("http_port", i64::from(defaults.http_port))
            .map_err(config_err)?
            .set_default("ws_port", i64::from(defaults.ws_port))
            .map_err(config_err)?
            .set_default("metrics_enabled", defaults.metrics_enabled)
            .map_err(config_err)?;

        let builder = match config_path {
            Some(path) if path.exists() => builder.add_source(config::File::from(path)),
            Some(_) => builder,
            None => match std::env::var("FLEETMCP_CONFIG") {
                Ok(path) => builder.add_source(config::File::with_name(&path).required(false)),
                Err(_) => builder,
            },
        };

        let raw = builder
            .add_source(
                config::Environment::with_prefix("FLEETMCP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_err)?;

        let mut config = defaults;
        if let Ok(name) = raw.get_string("name") {
            config.name = name;
        }
        let mode = std::env::var("MCP_INTERFACE_MODE").ok().or_else(|| raw.get_string("interface_mode").ok());
        if let Some(mode) = mode {
            config.interface_mode = parse_interface_mode(&mode)?;
        }
        if let Some(port) = env_port("MCP_HTTP_PORT").or_else(|| raw.get_int("http_port").ok().map(|p| p as u16)) {
            config.http_port = port;
        }
        if let Some(port) = env_port("MCP_WS_PORT").or_else(|| raw.get_int("ws_port").ok().map(|p| p as u16)) {
            config.ws_port = port;
        }
        if let Ok(bind) = raw.get_string("bind_address") {
            config.bind_address = bind;
        }
        if let Ok(enabled) = raw.get_bool("metrics_enabled") {
            config.metrics_enabled = enabled;
        }

        if let (Ok(host), Ok(port)) = (std::env::var("NATS_HOST"), std::env::var("NATS_PORT")) {
            let port: u16 = port
                .parse()
                .map_err(|_| CoordError::fatal("NATS_PORT is not a valid port number"))?;
            config.event_log = EventLogConfig::Nats { host, port };
        }

        Ok(config)
    }
}

fn parse_interface_mode(value: &str) -> ServerResult<InterfaceMode> {
    match value.to_ascii_lowercase().as_str() {
        "stdio" => Ok(InterfaceMode::Stdio),
        "http" => Ok(InterfaceMode::Http),
        "websocket" => Ok(InterfaceMode::Websocket),
        "remote" => Ok(InterfaceMode::Remote),
        "all" => Ok(InterfaceMode::All),
        other => Err(CoordError::fatal(format!("unknown interface mode: {other}"))),
    }
}

fn env_port(var: &str) -> Option<u16> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn config_err(e: config::ConfigError) -> CoordError {
    CoordError::fatal(format!("configuration error: {e}"))
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Parse an external-server configuration document into a name-keyed map,
/// per the wire spec's `{ servers: { <name>: {...} }, config: {...} }` shape.
pub fn parse_external_servers(document: &str) -> ServerResult<HashMap<String, BackendConfig>> {
    #[derive(Deserialize)]
    struct Document {
        servers: HashMap<String, serde_json::Value>,
    }

    let doc: Document = serde_json::from_str(document)?;
    let mut servers = HashMap::new();
    for (name, value) in doc.servers {
        let mut backend: BackendConfig = serde_json::from_value(value)?;
        backend.name = name.clone();
        servers.insert(name, backend);
    }
    Ok(servers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_listen_on_all_interfaces() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.interface_mode, InterfaceMode::All);
        assert!(config.interface_mode.wants_stdio());
        assert!(config.interface_mode.wants_http());
        assert!(config.interface_mode.wants_websocket());
    }

    #[test]
    fn parse_interface_mode_rejects_unknown_values() {
        assert!(parse_interface_mode("carrier-pigeon").is_err());
        assert!(parse_interface_mode("HTTP").is_ok());
    }

    #[test]
    fn parse_external_servers_extracts_backend_configs() {
        let doc = r#"{
            "servers": {
                "memory": {"command": "mem-server", "args": ["--stdio"]}
            },
            "config": {"startup_timeout_ms": 5000}
        }"#;
        let servers = parse_external_servers(doc).unwrap();
        let backend = servers.get("memory").unwrap();
        assert_eq!(backend.name, "memory");
        assert_eq!(backend.command, "mem-server");
    }
}
