//! Tool Registry (C8): the merged catalog of native tools and every ready
//! backend's discovered tools.
//!
//! Native tools are hard-coded (name, schema, handler dispatch target);
//! backend tools are refreshed from the [`crate::backends::Supervisor`] on
//! ready/dead transitions. Resolution is a direct name lookup against the
//! merged set — no prefix convention is assumed. Name collisions are
//! resolved first-registered-wins, with a warning event appended to the
//! Event Log.

use std::sync::Arc;

use dashmap::DashMap;
use fleetmcp_protocol::types::{Tool, ToolAnnotations, ToolInputSchema};

use crate::backends::Supervisor;
use crate::error::ServerResult;
use crate::event_log::{streams, EventKind, EventLog};
use crate::filter::FilterableTool;

/// Where a catalog entry's tool descriptor came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    /// One of the 12 hard-coded coordinator tools.
    Native,
    /// Discovered via `tools/list` from the named backend.
    Backend(String),
}

impl ToolSource {
    /// The `source` string the data model's tool descriptor carries.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Native => "native",
            Self::Backend(name) => name.as_str(),
        }
    }
}

/// A resolved catalog entry.
#[derive(Debug, Clone)]
pub struct ToolEntry {
    /// The wire tool descriptor.
    pub tool: Tool,
    /// Native or backend origin.
    pub source: ToolSource,
    /// Whether this tool may be exposed to a remote (untrusted) caller.
    pub remote_safe: bool,
}

/// The 12 native tool names, in the order spec's native-tools table lists
/// them. Used both to build schemas and, by the Router, to distinguish a
/// native dispatch from a backend one.
pub const NATIVE_TOOL_NAMES: &[&str] = &[
    "register_agent",
    "unregister_agent",
    "heartbeat",
    "create_task",
    "create_cross_codebase_task",
    "get_next_task",
    "complete_task",
    "get_task_board",
    "register_codebase",
    "add_codebase_dependency",
    "list_codebases",
    "get_codebase_status",
];

fn schema(properties: serde_json::Value, required: &[&str]) -> ToolInputSchema {
    let properties = match properties {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    };
    ToolInputSchema {
        schema_type: "object".to_string(),
        properties,
        required: if required.is_empty() {
            None
        } else {
            Some(required.iter().map(|s| s.to_string()).collect())
        },
    }
}

fn native_tool(name: &str, description: &str, properties: serde_json::Value, required: &[&str], read_only: bool) -> Tool {
    Tool {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        input_schema: schema(properties, required),
        annotations: Some(ToolAnnotations {
            title: None,
            read_only_hint: Some(read_only),
        }),
    }
}

/// Build the 12 hard-coded native tool descriptors.
#[must_use]
pub fn native_tools() -> Vec<Tool> {
    vec![
        native_tool(
            "register_agent",
            "Register a coordination agent and receive a session token.",
            serde_json::json!({
                "name": {"type": "string"},
                "capabilities": {"type": "array", "items": {"type": "string"}},
                "codebase_id": {"type": "string"},
                "cross_codebase_capable": {"type": "boolean"},
            }),
            &["name", "capabilities"],
            false,
        ),
        native_tool(
            "unregister_agent",
            "Unregister an agent, revoking its sessions.",
            serde_json::json!({"agent_id": {"type": "string"}}),
            &["agent_id"],
            false,
        ),
        native_tool(
            "heartbeat",
            "Keep an agent's session and liveness alive.",
            serde_json::json!({"agent_id": {"type": "string"}}),
            &["agent_id"],
            false,
        ),
        native_tool(
            "create_task",
            "Create a task and attempt immediate assignment.",
            serde_json::json!({
                "title": {"type": "string"},
                "description": {"type": "string"},
                "priority": {"type": "string", "enum": ["low", "normal", "high", "urgent"]},
                "required_capabilities": {"type": "array", "items": {"type": "string"}},
                "codebase_id": {"type": "string"},
                "file_paths": {"type": "array", "items": {"type": "string"}},
            }),
            &["title", "description"],
            false,
        ),
        native_tool(
            "create_cross_codebase_task",
            "Create a cross-codebase unit of work: a primary task plus one dependent per affected codebase.",
            serde_json::json!({
                "title": {"type": "string"},
                "description": {"type": "string"},
                "primary_codebase_id": {"type": "string"},
                "affected_codebases": {"type": "array", "items": {"type": "string"}},
                "strategy": {"type": "string", "enum": ["sequential", "parallel"]},
            }),
            &["title", "description", "primary_codebase_id", "affected_codebases", "strategy"],
            false,
        ),
        native_tool(
            "get_next_task",
            "Promote an agent's next queued task into its in-progress slot.",
            serde_json::json!({"agent_id": {"type": "string"}}),
            &["agent_id"],
            false,
        ),
        native_tool(
            "complete_task",
            "Mark an agent's current task completed.",
            serde_json::json!({"agent_id": {"type": "string"}, "result": {}}),
            &["agent_id"],
            false,
        ),
        native_tool(
            "get_task_board",
            "Fetch the full agent/pending-task board snapshot.",
            serde_json::json!({}),
            &[],
            true,
        ),
        native_tool(
            "register_codebase",
            "Register a known codebase.",
            serde_json::json!({
                "id": {"type": "string"},
                "name": {"type": "string"},
                "workspace_path": {"type": "string"},
                "description": {"type": "string"},
                "metadata": {"type": "object"},
            }),
            &["id", "name", "workspace_path"],
            false,
        ),
        native_tool(
            "add_codebase_dependency",
            "Add a dependency edge between two codebases.",
            serde_json::json!({
                "source_codebase_id": {"type": "string"},
                "target_codebase_id": {"type": "string"},
                "dependency_type": {"type": "string"},
                "metadata": {"type": "object"},
            }),
            &["source_codebase_id", "target_codebase_id", "dependency_type"],
            false,
        ),
        native_tool(
            "list_codebases",
            "List every known codebase.",
            serde_json::json!({}),
            &[],
            true,
        ),
        native_tool(
            "get_codebase_status",
            "Fetch a single codebase's status, including resident agent and active task counts.",
            serde_json::json!({"id": {"type": "string"}}),
            &["id"],
            true,
        ),
    ]
}

/// Owns the merged tool catalog and refreshes it against the Supervisor.
pub struct ToolRegistry {
    catalog: DashMap<String, ToolEntry>,
    supervisor: Arc<Supervisor>,
    event_log: Arc<dyn EventLog>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("catalog_size", &self.catalog.len())
            .finish()
    }
}

impl ToolRegistry {
    /// Build a registry pre-seeded with the native tools; call
    /// [`ToolRegistry::refresh`] to pull in backend tools.
    #[must_use]
    pub fn new(supervisor: Arc<Supervisor>, event_log: Arc<dyn EventLog>) -> Self {
        let catalog = DashMap::new();
        for tool in native_tools() {
            catalog.insert(
                tool.name.clone(),
                ToolEntry {
                    tool,
                    source: ToolSource::Native,
                    remote_safe: true,
                },
            );
        }
        Self {
            catalog,
            supervisor,
            event_log,
        }
    }

    /// Merge every `Ready` backend's tools into the catalog. Native tools
    /// are never evicted or shadowed. First-registered wins on a name
    /// collision between backends (insertion order over
    /// `Supervisor::ready_tools()`'s iteration); the losing tool is dropped
    /// and a warning event is appended.
    pub async fn refresh(&self) -> ServerResult<()> {
        let discovered = self.supervisor.ready_tools().await;
        let discovered_names: std::collections::HashSet<String> =
            discovered.iter().map(|(_, tool)| tool.name.clone()).collect();

        // Drop backend tools whose backend is no longer contributing them
        // (covers the dead/restarted-with-fewer-tools case).
        let stale: Vec<String> = self
            .catalog
            .iter()
            .filter(|entry| matches!(entry.value().source, ToolSource::Backend(_)))
            .filter(|entry| !discovered_names.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for name in stale {
            self.catalog.remove(&name);
        }

        for (backend_name, tool) in discovered {
            if let Some(existing) = self.catalog.get(&tool.name) {
                if existing.source != ToolSource::Backend(backend_name.clone()) {
                    self.event_log
                        .append(
                            streams::BACKENDS,
                            EventKind::ToolNameCollision,
                            serde_json::json!({
                                "tool": tool.name,
                                "incoming_source": backend_name,
                                "kept_source": existing.source.as_str(),
                            }),
                            None,
                        )
                        .await?;
                    continue;
                }
            }
            let remote_safe = crate::filter::default_remote_safe(&tool.name);
            self.catalog.insert(
                tool.name.clone(),
                ToolEntry {
                    tool,
                    source: ToolSource::Backend(backend_name),
                    remote_safe,
                },
            );
        }
        Ok(())
    }

    /// Resolve a tool name to its catalog entry.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<ToolEntry> {
        self.catalog.get(name).map(|e| e.clone())
    }

    /// Whether `name` is one of the 12 hard-coded native tools.
    #[must_use]
    pub fn is_native(name: &str) -> bool {
        NATIVE_TOOL_NAMES.contains(&name)
    }

    /// Snapshot the catalog as `FilterableTool`s, for the Tool Filter.
    #[must_use]
    pub fn filterable_catalog(&self) -> Vec<FilterableTool> {
        self.catalog
            .iter()
            .map(|entry| FilterableTool {
                tool: entry.value().tool.clone(),
                source: entry.value().source.as_str().to_string(),
                remote_safe: entry.value().remote_safe,
            })
            .collect()
    }

    /// The full catalog as wire `Tool` descriptors (unfiltered), for a local
    /// caller's `tools/list`.
    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.catalog.iter().map(|e| e.value().tool.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::InMemoryEventLog;

    fn registry() -> ToolRegistry {
        let event_log = InMemoryEventLog::shared();
        let supervisor = Arc::new(Supervisor::new(event_log.clone()));
        ToolRegistry::new(supervisor, event_log)
    }

    #[test]
    fn native_catalog_has_all_twelve_tools() {
        let reg = registry();
        assert_eq!(reg.tools().len(), NATIVE_TOOL_NAMES.len());
        for name in NATIVE_TOOL_NAMES {
            assert!(reg.resolve(name).is_some(), "missing native tool {name}");
        }
    }

    #[test]
    fn resolve_reports_native_source() {
        let reg = registry();
        let entry = reg.resolve("heartbeat").unwrap();
        assert_eq!(entry.source, ToolSource::Native);
    }

    #[tokio::test]
    async fn refresh_with_no_backends_keeps_native_catalog_intact() {
        let reg = registry();
        reg.refresh().await.unwrap();
        assert_eq!(reg.tools().len(), NATIVE_TOOL_NAMES.len());
    }
}
