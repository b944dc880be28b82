//! Native tool dispatch (C7/C8 seam): the 12 hard-coded tool implementations
//! the Router calls directly, plus the argument-extraction helpers they share.
//!
//! Each handler takes the raw `arguments` map off a `tools/call` request and
//! the shared [`CoordinatorState`], and returns the JSON value that becomes
//! the call's `structuredContent`. The Router wraps the result (or error)
//! into a [`fleetmcp_protocol::types::CallToolResult`].

use std::sync::Arc;

use fleetmcp_protocol::types::{CallToolResult, ContentBlock};
use serde_json::{Map, Value};

use crate::agents::AgentRegistry;
use crate::backends::Supervisor;
use crate::codebases::CodebaseRegistry;
use crate::error::{CoordError, ServerResult};
use crate::event_log::EventLog;
use crate::registry::ToolRegistry;
use crate::tasks::{CrossCodebaseSpec, CrossCodebaseStrategy, Priority, TaskRegistry, TaskSpec};

/// Everything a native tool handler needs: the four registries plus the
/// Event Log they all write through.
#[derive(Clone)]
pub struct CoordinatorState {
    /// Agent Registry (C3).
    pub agents: Arc<AgentRegistry>,
    /// Task Registry (C6).
    pub tasks: Arc<TaskRegistry>,
    /// Codebase Registry (C5).
    pub codebases: Arc<CodebaseRegistry>,
    /// External Server Supervisor (C2).
    pub supervisor: Arc<Supervisor>,
    /// Tool Registry (C8).
    pub tool_registry: Arc<ToolRegistry>,
    /// Event Log (C1).
    pub event_log: Arc<dyn EventLog>,
}

fn require_str(args: &Map<String, Value>, tool: &str, key: &str) -> ServerResult<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CoordError::invalid_params(tool, format!("missing or non-string `{key}`")))
}

fn optional_str(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn optional_bool(args: &Map<String, Value>, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn require_str_array(args: &Map<String, Value>, tool: &str, key: &str) -> ServerResult<Vec<String>> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .ok_or_else(|| CoordError::invalid_params(tool, format!("missing or non-array `{key}`")))
}

fn optional_str_array(args: &Map<String, Value>, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn optional_map(args: &Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    args.get(key).and_then(Value::as_object).cloned()
}

fn parse_priority(args: &Map<String, Value>, tool: &str) -> ServerResult<Priority> {
    match args.get("priority").and_then(Value::as_str) {
        None => Ok(Priority::default()),
        Some("low") => Ok(Priority::Low),
        Some("normal") => Ok(Priority::Normal),
        Some("high") => Ok(Priority::High),
        Some("urgent") => Ok(Priority::Urgent),
        Some(other) => Err(CoordError::invalid_params(tool, format!("unknown priority `{other}`"))),
    }
}

fn parse_strategy(args: &Map<String, Value>, tool: &str) -> ServerResult<CrossCodebaseStrategy> {
    match require_str(args, tool, "strategy")?.as_str() {
        "sequential" => Ok(CrossCodebaseStrategy::Sequential),
        "parallel" => Ok(CrossCodebaseStrategy::Parallel),
        other => Err(CoordError::invalid_params(tool, format!("unknown strategy `{other}`"))),
    }
}

/// `register_agent`.
pub async fn register_agent(state: &CoordinatorState, args: Map<String, Value>) -> ServerResult<Value> {
    let name = require_str(&args, "register_agent", "name")?;
    let capabilities = require_str_array(&args, "register_agent", "capabilities")?;
    let codebase_id = optional_str(&args, "codebase_id");
    let cross_codebase_capable = optional_bool(&args, "cross_codebase_capable", false);

    let result = state
        .agents
        .register(name, capabilities, codebase_id, cross_codebase_capable)
        .await?;
    Ok(serde_json::to_value(result)?)
}

/// `unregister_agent`.
pub async fn unregister_agent(state: &CoordinatorState, args: Map<String, Value>) -> ServerResult<Value> {
    let agent_id = require_str(&args, "unregister_agent", "agent_id")?;
    state.agents.unregister(&agent_id).await?;
    Ok(serde_json::json!({"ok": true}))
}

/// `heartbeat`.
pub async fn heartbeat(state: &CoordinatorState, args: Map<String, Value>) -> ServerResult<Value> {
    let agent_id = require_str(&args, "heartbeat", "agent_id")?;
    let server_time = state.agents.heartbeat(&agent_id).await?;
    Ok(serde_json::json!({"ok": true, "server_time": server_time}))
}

/// `create_task`.
pub async fn create_task(state: &CoordinatorState, args: Map<String, Value>) -> ServerResult<Value> {
    let title = require_str(&args, "create_task", "title")?;
    let description = require_str(&args, "create_task", "description")?;
    let priority = parse_priority(&args, "create_task")?;
    let required_capabilities = optional_str_array(&args, "required_capabilities");
    let codebase_id = optional_str(&args, "codebase_id");
    let file_paths = optional_str_array(&args, "file_paths");

    let spec = TaskSpec {
        title,
        description,
        priority,
        required_capabilities,
        codebase_id,
        file_paths,
    };
    let result = state.tasks.create_task(spec).await?;
    Ok(serde_json::to_value(result)?)
}

/// `create_cross_codebase_task`.
pub async fn create_cross_codebase_task(state: &CoordinatorState, args: Map<String, Value>) -> ServerResult<Value> {
    let title = require_str(&args, "create_cross_codebase_task", "title")?;
    let description = require_str(&args, "create_cross_codebase_task", "description")?;
    let primary_codebase_id = require_str(&args, "create_cross_codebase_task", "primary_codebase_id")?;
    let affected_codebases = require_str_array(&args, "create_cross_codebase_task", "affected_codebases")?;
    let strategy = parse_strategy(&args, "create_cross_codebase_task")?;

    let spec = CrossCodebaseSpec {
        title,
        description,
        primary_codebase_id,
        affected_codebases,
        strategy,
    };
    let result = state.tasks.create_cross_codebase_task(spec).await?;
    Ok(serde_json::to_value(result)?)
}

/// `get_next_task`.
pub async fn get_next_task(state: &CoordinatorState, args: Map<String, Value>) -> ServerResult<Value> {
    let agent_id = require_str(&args, "get_next_task", "agent_id")?;
    let task = state.tasks.get_next(&agent_id).await?;
    Ok(serde_json::json!({"task": task}))
}

/// `complete_task`.
pub async fn complete_task(state: &CoordinatorState, args: Map<String, Value>) -> ServerResult<Value> {
    let agent_id = require_str(&args, "complete_task", "agent_id")?;
    let result = args.get("result").cloned().unwrap_or(Value::Null);
    state.tasks.complete(&agent_id, result).await?;
    Ok(serde_json::json!({"ok": true}))
}

/// `get_task_board`.
pub async fn get_task_board(state: &CoordinatorState, _args: Map<String, Value>) -> ServerResult<Value> {
    Ok(serde_json::to_value(state.tasks.get_board())?)
}

/// `register_codebase`.
pub async fn register_codebase(state: &CoordinatorState, args: Map<String, Value>) -> ServerResult<Value> {
    let id = require_str(&args, "register_codebase", "id")?;
    let name = require_str(&args, "register_codebase", "name")?;
    let workspace_path = require_str(&args, "register_codebase", "workspace_path")?;
    let description = optional_str(&args, "description");
    let metadata = optional_map(&args, "metadata");

    state
        .codebases
        .register(id, name, workspace_path, description, metadata)
        .await?;
    Ok(serde_json::json!({"ok": true}))
}

/// `add_codebase_dependency`.
pub async fn add_codebase_dependency(state: &CoordinatorState, args: Map<String, Value>) -> ServerResult<Value> {
    let source_codebase_id = require_str(&args, "add_codebase_dependency", "source_codebase_id")?;
    let target_codebase_id = require_str(&args, "add_codebase_dependency", "target_codebase_id")?;
    let dependency_type = require_str(&args, "add_codebase_dependency", "dependency_type")?;
    let metadata = optional_map(&args, "metadata");

    state
        .codebases
        .add_dependency(&source_codebase_id, &target_codebase_id, dependency_type, metadata)
        .await?;
    Ok(serde_json::json!({"ok": true}))
}

/// `list_codebases`.
pub async fn list_codebases(state: &CoordinatorState, _args: Map<String, Value>) -> ServerResult<Value> {
    let codebases = state.codebases.list();
    Ok(serde_json::json!({"codebases": codebases}))
}

/// `get_codebase_status`.
pub async fn get_codebase_status(state: &CoordinatorState, args: Map<String, Value>) -> ServerResult<Value> {
    let id = require_str(&args, "get_codebase_status", "id")?;
    let codebase = state
        .codebases
        .get(&id)
        .ok_or_else(|| CoordError::UnknownCodebase(id.clone()))?;

    let resident_agent_count = state
        .agents
        .list()
        .into_iter()
        .filter(|a| a.codebase_id.as_deref() == Some(id.as_str()))
        .count();
    let active_task_count = state.tasks.active_count_for_codebase(&id);

    Ok(serde_json::to_value(crate::codebases::CodebaseStatus {
        codebase,
        resident_agent_count,
        active_task_count,
    })?)
}

/// Dispatch one of the 12 native tools by name. The Router calls this only
/// after [`crate::registry::ToolRegistry::is_native`] confirms `name` is not
/// a backend tool.
pub async fn dispatch_native(state: &CoordinatorState, name: &str, args: Map<String, Value>) -> ServerResult<Value> {
    match name {
        "register_agent" => register_agent(state, args).await,
        "unregister_agent" => unregister_agent(state, args).await,
        "heartbeat" => heartbeat(state, args).await,
        "create_task" => create_task(state, args).await,
        "create_cross_codebase_task" => create_cross_codebase_task(state, args).await,
        "get_next_task" => get_next_task(state, args).await,
        "complete_task" => complete_task(state, args).await,
        "get_task_board" => get_task_board(state, args).await,
        "register_codebase" => register_codebase(state, args).await,
        "add_codebase_dependency" => add_codebase_dependency(state, args).await,
        "list_codebases" => list_codebases(state, args).await,
        "get_codebase_status" => get_codebase_status(state, args).await,
        other => Err(CoordError::UnknownTool(other.to_string())),
    }
}

/// Wrap a native or backend dispatch result into the wire `CallToolResult`.
#[must_use]
pub fn to_call_result(value: Value) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::Text {
            text: value.to_string(),
        }],
        structured_content: Some(value),
        is_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::InMemoryEventLog;

    fn state() -> CoordinatorState {
        let event_log = InMemoryEventLog::shared();
        let agents = Arc::new(AgentRegistry::new(event_log.clone()));
        let codebases = Arc::new(CodebaseRegistry::new(event_log.clone()));
        let tasks = Arc::new(TaskRegistry::new(agents.clone(), codebases.clone(), event_log.clone()));
        let supervisor = Arc::new(Supervisor::new(event_log.clone()));
        let tool_registry = Arc::new(ToolRegistry::new(supervisor.clone(), event_log.clone()));
        CoordinatorState {
            agents,
            tasks,
            codebases,
            supervisor,
            tool_registry,
            event_log,
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn register_agent_returns_session_token() {
        let state = state();
        let result = register_agent(
            &state,
            args(serde_json::json!({"name": "CoderBlueKoala", "capabilities": ["coding"]})),
        )
        .await
        .unwrap();
        assert!(result.get("session_token").is_some());
    }

    #[tokio::test]
    async fn unregister_unknown_agent_is_unknown_entity() {
        let state = state();
        let err = unregister_agent(&state, args(serde_json::json!({"agent_id": "nope"})))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::UnknownAgent(_)));
    }

    #[tokio::test]
    async fn create_task_with_unknown_codebase_is_rejected() {
        let state = state();
        let err = create_task(
            &state,
            args(serde_json::json!({
                "title": "t",
                "description": "d",
                "codebase_id": "ghost",
            })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoordError::UnknownCodebase(_)));
    }

    #[tokio::test]
    async fn get_codebase_status_reports_zero_counts_for_fresh_codebase() {
        let state = state();
        register_codebase(
            &state,
            args(serde_json::json!({"id": "svc-a", "name": "Service A", "workspace_path": "/ws/a"})),
        )
        .await
        .unwrap();
        let status = get_codebase_status(&state, args(serde_json::json!({"id": "svc-a"})))
            .await
            .unwrap();
        assert_eq!(status["resident_agent_count"], 0);
        assert_eq!(status["active_task_count"], 0);
    }

    #[tokio::test]
    async fn dispatch_native_rejects_unknown_tool() {
        let state = state();
        let err = dispatch_native(&state, "delete_universe", Map::new()).await.unwrap_err();
        assert!(matches!(err, CoordError::UnknownTool(_)));
    }
}
