//! External-Server Supervisor (C7): spawns configured backend MCP servers
//! as child processes, multiplexes JSON-RPC requests over their stdio, and
//! restarts them with backoff on failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use fleetmcp_core::utils::RetryConfig;
use fleetmcp_protocol::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use fleetmcp_protocol::types::{RequestId, Tool};
use fleetmcp_transport::child_process::{ChildProcessConfig, ChildProcessTransport};
use fleetmcp_transport::core::{TransportMessage, TransportMessageMetadata};
use fleetmcp_transport::Transport;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::error::{CoordError, ServerResult};
use crate::event_log::{streams, EventKind, EventLog};

/// Launch and lifecycle configuration for one backend, per the
/// external-server configuration document's `servers.<name>` shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Logical name, also the tool-descriptor `source` value.
    pub name: String,
    /// Executable to launch.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Additional environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Whether a dead backend is automatically restarted.
    #[serde(default = "default_true")]
    pub auto_restart: bool,
    /// Restart attempt cap before the backend is permanently dead.
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
    /// Base restart delay; actual delay backs off exponentially from here.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// Deadline for the startup `tools/list` readiness probe.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// Optional human description.
    pub description: Option<String>,
}

const fn default_true() -> bool {
    true
}
const fn default_max_restart_attempts() -> u32 {
    5
}
const fn default_restart_delay_ms() -> u64 {
    500
}
const fn default_startup_timeout_ms() -> u64 {
    10_000
}

/// Backend health, per the data model's external server record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendHealth {
    /// Process spawned, readiness probe not yet complete.
    Starting,
    /// Readiness probe succeeded; tools cached and exposed.
    Ready,
    /// Process exited or probes failed; tools removed from the catalog.
    Dead,
    /// A restart attempt is scheduled or in flight.
    Restarting,
}

enum Command {
    Call {
        request: JsonRpcRequest,
        reply: oneshot::Sender<Result<JsonRpcResponse, CoordError>>,
    },
}

struct BackendState {
    health: BackendHealth,
    tools: Vec<Tool>,
    restart_attempts: u32,
    last_restart: Option<chrono::DateTime<chrono::Utc>>,
}

/// A supervised backend: its configuration, live state, and the channel
/// used to submit multiplexed calls to its owning actor task.
pub struct Backend {
    config: BackendConfig,
    state: RwLock<BackendState>,
    next_id: AtomicI64,
    cmd_tx: RwLock<Option<mpsc::Sender<Command>>>,
}

impl Backend {
    fn new(config: BackendConfig) -> Self {
        Self {
            config,
            state: RwLock::new(BackendState {
                health: BackendHealth::Starting,
                tools: Vec::new(),
                restart_attempts: 0,
                last_restart: None,
            }),
            next_id: AtomicI64::new(1),
            cmd_tx: RwLock::new(None),
        }
    }

    /// Current health state.
    pub async fn health(&self) -> BackendHealth {
        self.state.read().await.health
    }

    /// Tools last discovered via `tools/list`, empty unless `Ready`.
    pub async fn tools(&self) -> Vec<Tool> {
        self.state.read().await.tools.clone()
    }

    /// Issue a JSON-RPC call against this backend and await the correlated
    /// response, subject to `timeout`.
    pub async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> ServerResult<serde_json::Value> {
        let health = self.health().await;
        if health != BackendHealth::Ready {
            return Err(CoordError::backend_dead(self.config.name.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(method.to_string(), params, RequestId::Number(id));

        let Some(tx) = self.cmd_tx.read().await.clone() else {
            return Err(CoordError::backend_dead(self.config.name.clone()));
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(Command::Call { request, reply: reply_tx }).await.is_err() {
            return Err(CoordError::backend_dead(self.config.name.clone()));
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(Ok(response))) => {
                if let Some(error) = response.error {
                    Err(CoordError::internal(format!("backend {} error: {}", self.config.name, error.message)))
                } else {
                    Ok(response.result.unwrap_or(serde_json::Value::Null))
                }
            }
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(CoordError::backend_dead(self.config.name.clone())),
            Err(_) => Err(CoordError::backend_timeout(self.config.name.clone())),
        }
    }
}

/// Owns the set of configured backends and drives their spawn/supervise
/// lifecycle.
pub struct Supervisor {
    backends: DashMap<String, Arc<Backend>>,
    event_log: Arc<dyn EventLog>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("backend_count", &self.backends.len())
            .finish()
    }
}

impl Supervisor {
    /// Create a supervisor with no backends started yet; call
    /// [`Supervisor::start`] per configured backend.
    #[must_use]
    pub fn new(event_log: Arc<dyn EventLog>) -> Self {
        Self {
            backends: DashMap::new(),
            event_log,
        }
    }

    /// Spawn `config` and start its actor task. Returns once the process
    /// has been spawned; readiness is asynchronous and observed via
    /// [`Backend::health`].
    pub async fn start(&self, config: BackendConfig) -> ServerResult<()> {
        let name = config.name.clone();
        let backend = Arc::new(Backend::new(config));
        self.backends.insert(name.clone(), backend.clone());
        spawn_backend_actor(backend, self.event_log.clone());
        Ok(())
    }

    /// Fetch a backend handle by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Backend>> {
        self.backends.get(name).map(|b| b.clone())
    }

    /// All configured backend names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|e| e.key().clone()).collect()
    }

    /// Merge every `Ready` backend's tools into `(backend_name, tool)` pairs,
    /// for the Tool Registry's refresh.
    pub async fn ready_tools(&self) -> Vec<(String, Tool)> {
        let mut out = Vec::new();
        for entry in self.backends.iter() {
            let backend = entry.value();
            if backend.health().await == BackendHealth::Ready {
                for tool in backend.tools().await {
                    out.push((entry.key().clone(), tool));
                }
            }
        }
        out
    }
}

fn spawn_backend_actor(backend: Arc<Backend>, event_log: Arc<dyn EventLog>) {
    tokio::spawn(async move {
        let retry = RetryConfig::default()
            .with_max_attempts(backend.config.max_restart_attempts as usize)
            .with_base_delay(Duration::from_millis(backend.config.restart_delay_ms));

        loop {
            {
                let mut state = backend.state.write().await;
                state.health = BackendHealth::Starting;
            }

            match run_backend_once(&backend, &event_log).await {
                Ok(()) => {
                    // run_backend_once returns only when the backend dies.
                }
                Err(err) => {
                    tracing::warn!(backend = %backend.config.name, error = %err, "backend actor exited");
                }
            }

            {
                let mut state = backend.state.write().await;
                state.health = BackendHealth::Dead;
                state.tools.clear();
            }
            let _ = event_log
                .append(
                    streams::BACKENDS,
                    EventKind::ExternalServerDown,
                    serde_json::json!({"backend": backend.config.name}),
                    None,
                )
                .await;

            if !backend.config.auto_restart {
                return;
            }

            let attempt = {
                let mut state = backend.state.write().await;
                state.restart_attempts += 1;
                state.restart_attempts
            };
            if attempt as usize > retry.max_attempts {
                tracing::error!(backend = %backend.config.name, "backend exhausted restart attempts, staying dead");
                return;
            }

            {
                let mut state = backend.state.write().await;
                state.health = BackendHealth::Restarting;
                state.last_restart = Some(chrono::Utc::now());
            }
            tokio::time::sleep(retry.delay_for_attempt(attempt as usize)).await;
        }
    });
}

async fn run_backend_once(backend: &Arc<Backend>, event_log: &Arc<dyn EventLog>) -> ServerResult<()> {
    let child_config = ChildProcessConfig {
        command: backend.config.command.clone(),
        args: backend.config.args.clone(),
        environment: Some(backend.config.env.clone().into_iter().collect()),
        startup_timeout: Duration::from_millis(backend.config.startup_timeout_ms),
        ..ChildProcessConfig::default()
    };

    let mut transport = ChildProcessTransport::new(child_config);
    transport.connect().await?;

    let pending: Arc<DashMap<i64, oneshot::Sender<Result<JsonRpcResponse, CoordError>>>> =
        Arc::new(DashMap::new());
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    *backend.cmd_tx.write().await = Some(cmd_tx);

    let startup = tokio::time::timeout(
        Duration::from_millis(backend.config.startup_timeout_ms),
        initialize_backend(&mut transport),
    )
    .await
    .map_err(|_| CoordError::backend_timeout(backend.config.name.clone()))??;

    {
        let mut state = backend.state.write().await;
        state.health = BackendHealth::Ready;
        state.tools = startup;
        state.restart_attempts = 0;
    }
    event_log
        .append(
            streams::BACKENDS,
            EventKind::ExternalServerUp,
            serde_json::json!({"backend": backend.config.name}),
            None,
        )
        .await?;

    let mut consecutive_probe_failures = 0u8;
    let mut health_probe = tokio::time::interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(Command::Call { request, reply }) = cmd else {
                    return Ok(());
                };
                let id = request_id_as_i64(&request.id);
                if let Some(id) = id {
                    pending.insert(id, reply);
                }
                let payload = serde_json::to_vec(&request).map_err(CoordError::from)?;
                let message = TransportMessage {
                    id: fleetmcp_core::MessageId::Number(id.unwrap_or(0)),
                    payload: Bytes::from(payload),
                    metadata: TransportMessageMetadata::default(),
                };
                if transport.send(message).await.is_err() {
                    return Err(CoordError::backend_dead(backend.config.name.clone()));
                }
            }
            received = transport.receive() => {
                match received {
                    Ok(Some(message)) => {
                        if let Ok(response) = serde_json::from_slice::<JsonRpcResponse>(&message.payload) {
                            if let Some(id) = response.id.as_ref().and_then(request_id_as_i64) {
                                if let Some((_, waiter)) = pending.remove(&id) {
                                    let _ = waiter.send(Ok(response));
                                }
                                // Unmatched ids are logged and dropped, per contract.
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(_) => return Err(CoordError::backend_dead(backend.config.name.clone())),
                }
            }
            _ = health_probe.tick() => {
                match tokio::time::timeout(Duration::from_secs(5), probe_tools_list(&mut transport)).await {
                    Ok(Ok(())) => consecutive_probe_failures = 0,
                    _ => {
                        consecutive_probe_failures += 1;
                        if consecutive_probe_failures >= 2 {
                            return Err(CoordError::backend_dead(backend.config.name.clone()));
                        }
                    }
                }
            }
        }
    }
}

fn request_id_as_i64(id: &RequestId) -> Option<i64> {
    match id {
        RequestId::Number(n) => Some(*n),
        _ => None,
    }
}

async fn initialize_backend(transport: &mut ChildProcessTransport) -> ServerResult<Vec<Tool>> {
    send_request(transport, "initialize", Some(serde_json::json!({}))).await?;
    let tools_response = send_request(transport, "tools/list", None).await?;
    let tools: Vec<Tool> = tools_response
        .get("tools")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(CoordError::from)?
        .unwrap_or_default();
    Ok(tools)
}

async fn probe_tools_list(transport: &mut ChildProcessTransport) -> ServerResult<()> {
    send_request(transport, "tools/list", None).await?;
    Ok(())
}

async fn send_request(
    transport: &mut ChildProcessTransport,
    method: &str,
    params: Option<serde_json::Value>,
) -> ServerResult<serde_json::Value> {
    let request = JsonRpcRequest::new(method.to_string(), params, RequestId::Number(0));
    let payload = serde_json::to_vec(&request).map_err(CoordError::from)?;
    let message = TransportMessage {
        id: fleetmcp_core::MessageId::Number(0),
        payload: Bytes::from(payload),
        metadata: TransportMessageMetadata::default(),
    };
    transport.send(message).await?;

    loop {
        let Some(received) = transport.receive().await? else {
            continue;
        };
        if let Ok(response) = serde_json::from_slice::<JsonRpcResponse>(&received.payload) {
            if let Some(error) = response.error {
                return Err(error_to_coord_error(error));
            }
            return Ok(response.result.unwrap_or(serde_json::Value::Null));
        }
    }
}

fn error_to_coord_error(error: JsonRpcError) -> CoordError {
    CoordError::internal(format!("backend rejected request: {}", error.message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backend_config_values() {
        assert!(default_true());
        assert_eq!(default_max_restart_attempts(), 5);
        assert_eq!(default_restart_delay_ms(), 500);
    }
}
