//! Transport Adapters (C11): stdio, HTTP/SSE, and WebSocket surfaces wired
//! onto the shared [`Router`], plus the coordinator's startup/shutdown
//! lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use bytes::Bytes;
use futures::StreamExt;
use tokio::time::sleep;

use fleetmcp_core::context::{ClientId, ClientIdExtractor, RequestContext};
use fleetmcp_protocol::jsonrpc::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
use fleetmcp_transport::core::{TransportError, TransportMessageMetadata};
use fleetmcp_transport::{StdioTransport, Transport, TransportMessage};

use crate::agents::{spawn_staleness_tick, AgentRegistry};
use crate::backends::Supervisor;
use crate::codebases::CodebaseRegistry;
use crate::config::{CoordinatorConfig, EventLogConfig};
use crate::error::{CoordError, ServerResult};
use crate::event_log::{EventLog, InMemoryEventLog};
use crate::filter::SecurityContext;
use crate::handlers::CoordinatorState;
use crate::lifecycle::{HealthStatus, ServerLifecycle};
use crate::metrics::ServerMetrics;
use crate::registry::ToolRegistry;
use crate::router::Router;
use crate::session::{extract_session_token, spawn_sweeper};
use crate::tasks::TaskRegistry;

/// How often the Tool Registry re-pulls the catalog from supervised backends.
const TOOL_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// How often the Agent Registry checks for agents past their stale threshold.
/// Independent of the threshold itself, which is a per-agent comparison made
/// on every tick.
const STALENESS_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Handle for triggering graceful server shutdown from outside the run loop
/// (signal handlers, container orchestration, tests).
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    lifecycle: Arc<ServerLifecycle>,
}

impl ShutdownHandle {
    /// Trigger graceful shutdown.
    pub async fn shutdown(&self) {
        self.lifecycle.shutdown().await;
    }

    /// Whether shutdown has been initiated.
    pub async fn is_shutting_down(&self) -> bool {
        use crate::lifecycle::ServerState;
        matches!(
            self.lifecycle.state().await,
            ServerState::ShuttingDown | ServerState::Stopped
        )
    }
}

/// The coordinator: the registries wired into a [`Router`], plus whichever
/// transports `config.interface_mode` selects.
pub struct CoordinatorServer {
    config: CoordinatorConfig,
    state: CoordinatorState,
    router: Arc<Router>,
    client_ids: Arc<ClientIdExtractor>,
    lifecycle: Arc<ServerLifecycle>,
    metrics: Arc<ServerMetrics>,
}

impl std::fmt::Debug for CoordinatorServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorServer")
            .field("name", &self.config.name)
            .field("interface_mode", &self.config.interface_mode)
            .finish()
    }
}

impl CoordinatorServer {
    /// Build every registry and the Supervisor, spawning its configured
    /// backends. Does not bring up any transport yet — call [`Self::run`].
    pub async fn new(config: CoordinatorConfig) -> ServerResult<Self> {
        let event_log = build_event_log(&config.event_log);

        let agents = Arc::new(AgentRegistry::with_stale_threshold(
            event_log.clone(),
            config.task.stale_threshold,
        ));
        let codebases = Arc::new(CodebaseRegistry::new(event_log.clone()));
        let tasks = Arc::new(TaskRegistry::new(agents.clone(), codebases.clone(), event_log.clone()));
        let supervisor = Arc::new(Supervisor::new(event_log.clone()));

        for backend in config.external_servers.values() {
            supervisor.start(backend.clone()).await?;
        }

        let tool_registry = Arc::new(ToolRegistry::new(supervisor.clone(), event_log.clone()));
        let state = CoordinatorState {
            agents: agents.clone(),
            tasks,
            codebases,
            supervisor,
            tool_registry: tool_registry.clone(),
            event_log,
        };

        spawn_sweeper(agents.sessions(), config.session.ttl);
        spawn_staleness_tick(agents.clone(), STALENESS_TICK_INTERVAL);
        spawn_tool_refresh(tool_registry);

        Ok(Self {
            config,
            router: Arc::new(Router::new(state.clone())),
            state,
            client_ids: Arc::new(ClientIdExtractor::new()),
            lifecycle: Arc::new(ServerLifecycle::new()),
            metrics: Arc::new(ServerMetrics::new()),
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Shared registry/supervisor state, for embedding (tests, the CLI).
    #[must_use]
    pub const fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// Lifecycle handle (health checks, state).
    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<ServerLifecycle> {
        &self.lifecycle
    }

    /// Metrics collector.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// A handle that can trigger shutdown from outside `run`.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            lifecycle: self.lifecycle.clone(),
        }
    }

    /// Current health status.
    pub async fn health(&self) -> HealthStatus {
        self.lifecycle.health().await
    }

    /// Bring up every transport `config.interface_mode` selects and run
    /// until shutdown is signalled (Ctrl+C, SIGTERM, or `ShutdownHandle`).
    pub async fn run(self: Arc<Self>) -> ServerResult<()> {
        self.lifecycle.start().await;
        install_signal_handlers(self.lifecycle.clone());

        let mut tasks = Vec::new();

        if self.config.interface_mode.wants_stdio() {
            let server = self.clone();
            tasks.push(tokio::spawn(async move { server.run_stdio().await }));
        }
        if self.config.interface_mode.wants_http() || self.config.interface_mode.wants_websocket() {
            let server = self.clone();
            tasks.push(tokio::spawn(async move { server.run_http().await }));
        }

        for task in tasks {
            if let Ok(Err(e)) = task.await {
                tracing::error!(error = %e, "transport task exited with an error");
            }
        }

        tracing::info!("coordinator shutdown complete");
        Ok(())
    }

    /// Run the stdio transport loop alone (used when `interface_mode` is
    /// `stdio` only, and by tests).
    pub async fn run_stdio(&self) -> ServerResult<()> {
        tracing::info!("starting stdio transport");
        let mut transport = StdioTransport::new();
        transport.connect().await?;

        let mut shutdown = self.lifecycle.shutdown_signal();
        let mut current_session: Option<String> = None;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("shutdown signal received, stopping stdio transport");
                    break;
                }
                received = transport.receive() => {
                    match received {
                        Ok(Some(message)) => {
                            if let Err(e) = self
                                .handle_stdio_message(&mut transport, message, &mut current_session)
                                .await
                            {
                                tracing::warn!(error = %e, "failed to handle stdio message");
                            }
                        }
                        Ok(None) => sleep(Duration::from_millis(5)).await,
                        Err(TransportError::ReceiveFailed(msg)) if msg.contains("disconnected") => {
                            tracing::info!("stdio transport disconnected");
                            break;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "stdio receive failed");
                            sleep(Duration::from_millis(50)).await;
                        }
                    }
                }
            }
        }

        transport.disconnect().await.ok();
        Ok(())
    }

    async fn handle_stdio_message(
        &self,
        transport: &mut StdioTransport,
        message: TransportMessage,
        current_session: &mut Option<String>,
    ) -> ServerResult<()> {
        let Ok(text) = std::str::from_utf8(&message.payload) else {
            tracing::warn!("invalid UTF-8 on stdio transport");
            return Ok(());
        };

        let Some(response) = self
            .dispatch_text(text, ClientId::Anonymous, current_session.clone(), SecurityContext::Local)
            .await
        else {
            return Ok(());
        };

        if let Some(token) = extract_session_token_from_result(&response) {
            *current_session = Some(token);
        }

        let reply = TransportMessage::with_metadata(
            message.id,
            Bytes::from(serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string())),
            TransportMessageMetadata::with_content_type("application/json"),
        );
        transport.send(reply).await?;
        Ok(())
    }

    /// Parse one line of JSON-RPC text and route it. Returns `None` for
    /// notifications, which get no reply.
    async fn dispatch_text(
        &self,
        text: &str,
        client_id: ClientId,
        session_id: Option<String>,
        security: SecurityContext,
    ) -> Option<JsonRpcResponse> {
        let mut ctx = RequestContext::new(client_id);
        if let Some(token) = session_id {
            ctx = ctx.with_session_id(token);
        }

        match serde_json::from_str::<JsonRpcMessage>(text) {
            Ok(JsonRpcMessage::Request(request)) => Some(self.router.route(request, ctx, security).await),
            Ok(JsonRpcMessage::RequestBatch(batch)) => {
                let mut responses = Vec::with_capacity(batch.items.len());
                for request in batch.items {
                    responses.push(self.router.route(request, ctx.derive(), security).await);
                }
                Some(responses_to_batch_response(responses))
            }
            Ok(JsonRpcMessage::Notification(_)) => None,
            Ok(JsonRpcMessage::Response(_) | JsonRpcMessage::ResponseBatch(_) | JsonRpcMessage::MessageBatch(_)) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse JSON-RPC message");
                Some(parse_error_response())
            }
        }
    }

    /// Bring up the HTTP surface (`POST /mcp/request`, `GET /mcp/stream`,
    /// `GET /health`, `GET /mcp/tools`, `POST /mcp/tools/:name`) and, when
    /// `interface_mode` wants it, the `GET /ws` WebSocket upgrade route.
    pub async fn run_http(&self) -> ServerResult<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| CoordError::fatal(format!("invalid bind address: {e}")))?;

        let state = Arc::new(self.shared());

        let mut app = axum::Router::new()
            .route("/health", get(health_handler))
            .route("/mcp/request", post(request_handler))
            .route("/mcp/stream", get(stream_handler))
            .route("/mcp/tools", get(list_tools_handler))
            .route("/mcp/tools/:name", post(call_tool_handler));

        if self.config.interface_mode.wants_websocket() {
            app = app.route("/ws", get(websocket_handler));
        }

        let app = app.with_state(state);

        tracing::info!(%addr, "starting HTTP transport");
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| CoordError::fatal(format!("failed to bind {addr}: {e}")))?;

        let mut shutdown = self.lifecycle.shutdown_signal();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await
            .map_err(|e| CoordError::fatal(format!("HTTP server error: {e}")))?;

        Ok(())
    }

    fn shared(&self) -> SharedHttpState {
        SharedHttpState {
            router: self.router.clone(),
            client_ids: self.client_ids.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

#[derive(Clone)]
struct SharedHttpState {
    router: Arc<Router>,
    client_ids: Arc<ClientIdExtractor>,
    lifecycle: Arc<ServerLifecycle>,
}

fn header_map_to_plain(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_lowercase(), v.to_string())))
        .collect()
}

fn build_http_context(headers: &HeaderMap, client_ids: &ClientIdExtractor) -> RequestContext {
    let plain = header_map_to_plain(headers);
    let client_id = client_ids.extract_client_id(&plain, None);
    let mut ctx = RequestContext::new(client_id);
    if let Some(token) = extract_session_token(&plain) {
        ctx = ctx.with_session_id(token);
    }
    ctx
}

async fn health_handler(State(state): State<Arc<SharedHttpState>>) -> impl IntoResponse {
    let health = state.lifecycle.health().await;
    (
        if health.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE },
        Json(serde_json::json!({"healthy": health.healthy})),
    )
}

async fn request_handler(
    State(state): State<Arc<SharedHttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let ctx = build_http_context(&headers, &state.client_ids);
    let text = String::from_utf8_lossy(&body).into_owned();

    let response = match serde_json::from_str::<JsonRpcRequest>(&text) {
        Ok(request) => state.router.route(request, ctx, SecurityContext::Remote).await,
        Err(_) => parse_error_response(),
    };

    let mut http_response = Json(response).into_response();
    if let Ok(value) = fleetmcp_transport::http::server_header_value().parse() {
        http_response.headers_mut().insert(axum::http::header::SERVER, value);
    }
    if let Ok(value) = fleetmcp_protocol::PROTOCOL_VERSION.parse() {
        http_response
            .headers_mut()
            .insert(fleetmcp_transport::http::PROTOCOL_VERSION_HEADER, value);
    }
    http_response
}

async fn stream_handler(
    State(_state): State<Arc<SharedHttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let session_id = fleetmcp_transport::http::extract_session_token(&headers).unwrap_or_else(|| "anonymous".to_string());
    let config = fleetmcp_transport::http::HttpTransportConfig::default();
    let (_tx, rx) = tokio::sync::mpsc::channel(1);
    let stream = fleetmcp_transport::http::SseStream::new(
        session_id,
        fleetmcp_protocol::PROTOCOL_VERSION,
        &config,
        rx,
    )
    .map(Ok::<_, std::convert::Infallible>);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn list_tools_handler(State(state): State<Arc<SharedHttpState>>, headers: HeaderMap) -> impl IntoResponse {
    let ctx = build_http_context(&headers, &state.client_ids);
    let request = JsonRpcRequest::without_params(
        "tools/list".to_string(),
        fleetmcp_protocol::types::RequestId::Number(0),
    );
    let response = state.router.route(request, ctx, SecurityContext::Remote).await;
    Json(response.result.unwrap_or(serde_json::Value::Null))
}

async fn call_tool_handler(
    State(state): State<Arc<SharedHttpState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(arguments): Json<serde_json::Value>,
) -> impl IntoResponse {
    let ctx = build_http_context(&headers, &state.client_ids);
    let params = serde_json::json!({"name": name, "arguments": arguments});
    let request = JsonRpcRequest::new(
        "tools/call".to_string(),
        Some(params),
        fleetmcp_protocol::types::RequestId::Number(0),
    );
    let response = state.router.route(request, ctx, SecurityContext::Remote).await;
    Json(response)
}

async fn websocket_handler(
    State(state): State<Arc<SharedHttpState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let ctx = build_http_context(&headers, &state.client_ids);
    ws.on_upgrade(move |socket| handle_websocket(socket, state, ctx))
}

async fn handle_websocket(mut socket: WebSocket, state: Arc<SharedHttpState>, ctx: RequestContext) {
    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let response = match serde_json::from_str::<JsonRpcRequest>(&text) {
            Ok(request) => state.router.route(request, ctx.derive(), SecurityContext::Remote).await,
            Err(_) => parse_error_response(),
        };

        let Ok(payload) = serde_json::to_string(&response) else {
            continue;
        };
        if socket.send(WsMessage::Text(payload)).await.is_err() {
            break;
        }
    }
}

fn parse_error_response() -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: fleetmcp_protocol::jsonrpc::JsonRpcVersion,
        id: None,
        result: None,
        error: Some(fleetmcp_protocol::jsonrpc::JsonRpcError {
            code: fleetmcp_protocol::error_codes::PARSE_ERROR,
            message: "parse error".to_string(),
            data: None,
        }),
    }
}

fn responses_to_batch_response(responses: Vec<JsonRpcResponse>) -> JsonRpcResponse {
    // Router has no native batch-response envelope; a batch reply is encoded
    // as a successful response whose result is the array of individual
    // responses, matching how most JSON-RPC batch replies are framed.
    JsonRpcResponse {
        jsonrpc: fleetmcp_protocol::jsonrpc::JsonRpcVersion,
        id: None,
        result: Some(serde_json::to_value(responses).unwrap_or(serde_json::Value::Null)),
        error: None,
    }
}

fn extract_session_token_from_result(response: &JsonRpcResponse) -> Option<String> {
    response
        .result
        .as_ref()
        .and_then(|v| v.get("structuredContent"))
        .and_then(|v| v.get("session_token"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn build_event_log(config: &EventLogConfig) -> Arc<dyn EventLog> {
    match config {
        EventLogConfig::Memory => InMemoryEventLog::shared(),
        EventLogConfig::Nats { host, port } => {
            tracing::warn!(
                host,
                port,
                "NATS event log backend configured but not available in this build; falling back to the in-memory backend"
            );
            InMemoryEventLog::shared()
        }
    }
}

fn spawn_tool_refresh(tool_registry: Arc<ToolRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TOOL_REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = tool_registry.refresh().await {
                tracing::warn!(error = %e, "tool registry refresh failed");
            }
        }
    })
}

fn install_signal_handlers(lifecycle: Arc<ServerLifecycle>) {
    let ctrl_c_lifecycle = lifecycle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, initiating shutdown");
            ctrl_c_lifecycle.shutdown().await;
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    tracing::info!("SIGTERM received, initiating shutdown");
                    lifecycle.shutdown().await;
                }
                Err(e) => tracing::warn!(error = %e, "failed to install SIGTERM handler"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_server_starts_with_no_backends() {
        let config = CoordinatorConfig::default();
        let server = CoordinatorServer::new(config).await.unwrap();
        assert!(server.state.supervisor.names().is_empty());
    }

    #[tokio::test]
    async fn shutdown_handle_reports_shutting_down() {
        let config = CoordinatorConfig::default();
        let server = CoordinatorServer::new(config).await.unwrap();
        let handle = server.shutdown_handle();
        assert!(!handle.is_shutting_down().await);
        handle.shutdown().await;
        assert!(handle.is_shutting_down().await);
    }
}
