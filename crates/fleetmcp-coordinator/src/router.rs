//! Router / Unified MCP Server (C9): the seven-step request pipeline that
//! ties the Tool Registry, Tool Filter, Session Manager, and Task Registry
//! together behind the `initialize` / `tools/list` / `tools/call` surface.

use fleetmcp_core::context::RequestContext;
use fleetmcp_protocol::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JsonRpcVersion};
use fleetmcp_protocol::types::{
    CallToolRequest, Implementation, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ToolsCapabilities,
};

use crate::error::{CoordError, ServerResult};
use crate::filter::{FilterPolicy, SecurityContext};
use crate::handlers::{dispatch_native, to_call_result, CoordinatorState};
use crate::registry::ToolRegistry;
use crate::session::SessionRejection;

/// End-to-end ceiling for a single backend-bound request (§5 default).
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Ties the registries together behind the JSON-RPC surface.
pub struct Router {
    state: CoordinatorState,
    filter_policy: FilterPolicy,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").finish()
    }
}

impl Router {
    /// Build a router over `state` with the default (deny-nothing-beyond-
    /// `remote_safe`) filter policy.
    #[must_use]
    pub fn new(state: CoordinatorState) -> Self {
        Self::with_filter_policy(state, FilterPolicy::new())
    }

    /// Build a router with an explicit [`FilterPolicy`] (e.g. deployment-
    /// specific `deny_patterns`).
    #[must_use]
    pub fn with_filter_policy(state: CoordinatorState, filter_policy: FilterPolicy) -> Self {
        Self { state, filter_policy }
    }

    /// Route one JSON-RPC request through the seven-step pipeline.
    /// `security` is set by the Transport Adapter (`local` for stdio,
    /// `remote` for HTTP/WS).
    pub async fn route(&self, request: JsonRpcRequest, ctx: RequestContext, security: SecurityContext) -> JsonRpcResponse {
        match self.dispatch(&request, ctx, security).await {
            Ok(result) => success_response(&request, result),
            Err(err) => error_response(&request, &err),
        }
    }

    async fn dispatch(
        &self,
        request: &JsonRpcRequest,
        ctx: RequestContext,
        security: SecurityContext,
    ) -> ServerResult<serde_json::Value> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "tools/list" => self.handle_list_tools(security),
            "tools/call" => self.handle_call_tool(request, ctx).await,
            "health" => Ok(serde_json::json!({"status": "ok"})),
            "ping" => Ok(serde_json::json!({"pong": true})),
            other => Err(CoordError::InvalidRequest(format!("unknown method: {other}"))),
        }
    }

    fn handle_initialize(&self, request: &JsonRpcRequest) -> ServerResult<serde_json::Value> {
        let params = request
            .params
            .clone()
            .ok_or_else(|| CoordError::InvalidRequest("initialize requires params".to_string()))?;
        let _init: InitializeRequest = serde_json::from_value(params)
            .map_err(|e| CoordError::invalid_params("initialize", e.to_string()))?;

        let result = InitializeResult {
            protocol_version: fleetmcp_protocol::PROTOCOL_VERSION.to_string(),
            server_info: Implementation {
                name: crate::SERVER_NAME.to_string(),
                title: Some("Agent Coordinator".to_string()),
                version: crate::SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                experimental: None,
                tools: Some(ToolsCapabilities { list_changed: Some(false) }),
            },
            instructions: None,
        };
        Ok(serde_json::to_value(result)?)
    }

    fn handle_list_tools(&self, security: SecurityContext) -> ServerResult<serde_json::Value> {
        let catalog = self.state.tool_registry.filterable_catalog();
        let tools = self
            .filter_policy
            .apply(&catalog, security)
            .into_iter()
            .map(|entry| entry.tool.clone())
            .collect();
        let result = ListToolsResult { tools, next_cursor: None };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_call_tool(&self, request: &JsonRpcRequest, ctx: RequestContext) -> ServerResult<serde_json::Value> {
        let params = request
            .params
            .clone()
            .ok_or_else(|| CoordError::InvalidRequest("tools/call requires params".to_string()))?;
        let call: CallToolRequest = serde_json::from_value(params)
            .map_err(|e| CoordError::invalid_params("tools/call", e.to_string()))?;
        let arguments = call.arguments.unwrap_or_default();

        // register_agent is the bootstrap call: a caller has no session token
        // until it returns one, so it is the one tool exempt from authenticate().
        if call.name == "register_agent" {
            let value = dispatch_native(&self.state, &call.name, arguments).await?;
            return Ok(serde_json::to_value(to_call_result(value))?);
        }

        let agent_id = self.authenticate(&ctx)?;
        self.state.agents.heartbeat(&agent_id).await?;

        let is_native = ToolRegistry::is_native(&call.name);

        if is_native {
            let value = dispatch_native(&self.state, &call.name, arguments).await?;
            return Ok(serde_json::to_value(to_call_result(value))?);
        }

        let Some(entry) = self.state.tool_registry.resolve(&call.name) else {
            return Err(CoordError::UnknownTool(call.name));
        };
        let crate::registry::ToolSource::Backend(backend_name) = entry.source else {
            return Err(CoordError::UnknownTool(call.name));
        };

        let hint = arguments.values().find_map(|v| v.as_str()).map(str::to_string);
        self.state.tasks.update_activity(&agent_id, &call.name, hint.as_deref()).await?;

        let backend = self
            .state
            .supervisor
            .get(&backend_name)
            .ok_or_else(|| CoordError::backend_dead(backend_name.clone()))?;
        let call_params = serde_json::json!({"name": call.name, "arguments": arguments});
        let call_result = backend.call("tools/call", Some(call_params), REQUEST_TIMEOUT).await;

        self.close_auto_task(&agent_id, call_result.is_ok()).await?;

        let value = call_result?;
        Ok(serde_json::to_value(to_call_result(value))?)
    }

    /// Validate the session token carried on `ctx`, returning the bound
    /// agent id.
    fn authenticate(&self, ctx: &RequestContext) -> ServerResult<String> {
        let Some(token) = ctx.session_id.as_deref() else {
            return Err(CoordError::Unauthenticated);
        };
        self.state.agents.sessions().validate(token).map_err(|rejection| match rejection {
            SessionRejection::Unknown => CoordError::Unauthenticated,
            SessionRejection::Expired => CoordError::SessionExpired,
            SessionRejection::Revoked => CoordError::SessionRevoked,
        })
    }

    /// Response post-touch: close out the agent's auto-generated task (if
    /// any) on the logical end of a backend tool call. No-op if the
    /// agent's current task is the caller's own explicit task.
    async fn close_auto_task(&self, agent_id: &str, succeeded: bool) -> ServerResult<()> {
        let Some(task_id) = self.state.agents.current_task(agent_id) else {
            return Ok(());
        };
        let Some(task) = self.state.tasks.get(&task_id) else {
            return Ok(());
        };
        if !task.auto_generated {
            return Ok(());
        }
        if succeeded {
            self.state.tasks.complete(agent_id, serde_json::Value::Null).await
        } else {
            self.state.tasks.fail(agent_id, "backend call failed").await
        }
    }
}

fn success_response<T: serde::Serialize>(request: &JsonRpcRequest, result: T) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JsonRpcVersion,
        id: Some(request.id.clone()),
        result: Some(serde_json::to_value(result).unwrap_or(serde_json::Value::Null)),
        error: None,
    }
}

fn error_response(request: &JsonRpcRequest, error: &CoordError) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JsonRpcVersion,
        id: Some(request.id.clone()),
        result: None,
        error: Some(error.to_jsonrpc_error()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRegistry;
    use crate::backends::Supervisor;
    use crate::codebases::CodebaseRegistry;
    use crate::event_log::InMemoryEventLog;
    use crate::tasks::TaskRegistry;
    use fleetmcp_core::context::ClientId;
    use fleetmcp_protocol::types::RequestId;
    use std::sync::Arc;

    fn router() -> (Router, Arc<AgentRegistry>) {
        let event_log = InMemoryEventLog::shared();
        let agents = Arc::new(AgentRegistry::new(event_log.clone()));
        let codebases = Arc::new(CodebaseRegistry::new(event_log.clone()));
        let tasks = Arc::new(TaskRegistry::new(agents.clone(), codebases.clone(), event_log.clone()));
        let supervisor = Arc::new(Supervisor::new(event_log.clone()));
        let tool_registry = Arc::new(ToolRegistry::new(supervisor.clone(), event_log.clone()));
        let state = CoordinatorState {
            agents: agents.clone(),
            tasks,
            codebases,
            supervisor,
            tool_registry,
            event_log,
        };
        (Router::new(state), agents)
    }

    fn request(method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(method.to_string(), params, RequestId::Number(1))
    }

    #[tokio::test]
    async fn tools_call_without_session_is_unauthenticated() {
        let (router, _agents) = router();
        let ctx = RequestContext::new(ClientId::Anonymous);
        let req = request(
            "tools/call",
            Some(serde_json::json!({"name": "get_task_board", "arguments": {}})),
        );
        let response = router.route(req, ctx, SecurityContext::Local).await;
        assert_eq!(response.error.unwrap().code, -32001);
    }

    #[tokio::test]
    async fn tools_call_dispatches_native_tool_with_valid_session() {
        let (router, agents) = router();
        let registration = agents
            .register("CoderBlueKoala".to_string(), vec!["coding".to_string()], None, false)
            .await
            .unwrap();

        let ctx = RequestContext::new(ClientId::Anonymous).with_session_id(registration.session_token);

        let req = request(
            "tools/call",
            Some(serde_json::json!({"name": "get_task_board", "arguments": {}})),
        );
        let response = router.route(req, ctx, SecurityContext::Local).await;
        assert!(response.error.is_none());
        assert!(response.result.is_some());
    }

    #[tokio::test]
    async fn register_agent_does_not_require_a_session() {
        let (router, _agents) = router();
        let ctx = RequestContext::new(ClientId::Anonymous);
        let req = request(
            "tools/call",
            Some(serde_json::json!({
                "name": "register_agent",
                "arguments": {"name": "CoderBlueKoala", "capabilities": ["coding"]},
            })),
        );
        let response = router.route(req, ctx, SecurityContext::Local).await;
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn initialize_is_unauthenticated() {
        let (router, _agents) = router();
        let ctx = RequestContext::new(ClientId::Anonymous);
        let req = request(
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": fleetmcp_protocol::PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0.1.0"},
            })),
        );
        let response = router.route(req, ctx, SecurityContext::Local).await;
        assert!(response.error.is_none());
    }
}
