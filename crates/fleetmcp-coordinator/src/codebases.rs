//! Codebase Registry (C5): known codebases, workspace paths, and the
//! inter-codebase dependency graph.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{CoordError, ServerResult};
use crate::event_log::{streams, EventKind, EventLog};

/// A dependency edge between two codebases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    /// Codebase this dependency points to.
    pub target_codebase_id: String,
    /// Relationship kind, e.g. `"imports"`, `"shares-schema"`.
    pub dependency_type: String,
    /// Free-form metadata describing the edge.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A known codebase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Codebase {
    /// Stable id, caller-supplied at registration.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Absolute or workspace-relative path to the codebase's root.
    pub workspace_path: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Free-form metadata map.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Outgoing dependency edges.
    pub dependencies: Vec<Dependency>,
}

/// Snapshot returned by `get_codebase_status` / `list_codebases`.
#[derive(Debug, Clone, Serialize)]
pub struct CodebaseStatus {
    /// The codebase record itself.
    pub codebase: Codebase,
    /// Number of agents whose `home codebase` is this one.
    pub resident_agent_count: usize,
    /// Number of tasks currently scoped to this codebase in non-terminal
    /// states.
    pub active_task_count: usize,
}

/// Owns the codebase table: registration, dependency edges, and lookups used
/// by the Task Registry to resolve a task's codebase and enumerate affected
/// codebases for cross-codebase tasks.
pub struct CodebaseRegistry {
    codebases: DashMap<String, Codebase>,
    event_log: Arc<dyn EventLog>,
}

impl std::fmt::Debug for CodebaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodebaseRegistry")
            .field("count", &self.codebases.len())
            .finish()
    }
}

impl CodebaseRegistry {
    /// Create a registry backed by `event_log`.
    #[must_use]
    pub fn new(event_log: Arc<dyn EventLog>) -> Self {
        Self {
            codebases: DashMap::new(),
            event_log,
        }
    }

    /// Register a codebase. Workspace paths must be unique across the
    /// registry; re-registration of the same id updates the existing
    /// record in place.
    pub async fn register(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        workspace_path: impl Into<String>,
        description: Option<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> ServerResult<()> {
        let id = id.into();
        let workspace_path = workspace_path.into();

        if let Some(existing) = self
            .codebases
            .iter()
            .find(|entry| entry.workspace_path == workspace_path && entry.id != id)
        {
            return Err(CoordError::internal(format!(
                "workspace path {workspace_path} already registered to codebase {}",
                existing.id
            )));
        }

        let codebase = Codebase {
            id: id.clone(),
            name: name.into(),
            workspace_path,
            description,
            metadata: metadata.unwrap_or_default(),
            dependencies: self
                .codebases
                .get(&id)
                .map(|c| c.dependencies.clone())
                .unwrap_or_default(),
        };

        self.codebases.insert(id.clone(), codebase.clone());

        self.event_log
            .append(
                streams::CODEBASES,
                EventKind::CodebaseRegistered,
                serde_json::json!({"codebase_id": id, "name": codebase.name}),
                None,
            )
            .await?;

        Ok(())
    }

    /// Add a dependency edge `source -> target`. Cycles are permitted; the
    /// scheduler ignores them.
    pub async fn add_dependency(
        &self,
        source_codebase_id: &str,
        target_codebase_id: &str,
        dependency_type: impl Into<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> ServerResult<()> {
        if !self.codebases.contains_key(target_codebase_id) {
            return Err(CoordError::UnknownCodebase(target_codebase_id.to_string()));
        }

        let mut source = self
            .codebases
            .get_mut(source_codebase_id)
            .ok_or_else(|| CoordError::UnknownCodebase(source_codebase_id.to_string()))?;

        source.dependencies.push(Dependency {
            target_codebase_id: target_codebase_id.to_string(),
            dependency_type: dependency_type.into(),
            metadata: metadata.unwrap_or_default(),
        });
        drop(source);

        self.event_log
            .append(
                streams::CODEBASES,
                EventKind::DependencyAdded,
                serde_json::json!({
                    "source_codebase_id": source_codebase_id,
                    "target_codebase_id": target_codebase_id,
                }),
                None,
            )
            .await?;

        Ok(())
    }

    /// Fetch a codebase by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Codebase> {
        self.codebases.get(id).map(|c| c.clone())
    }

    /// Whether `id` is a known codebase.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.codebases.contains_key(id)
    }

    /// All known codebases.
    #[must_use]
    pub fn list(&self) -> Vec<Codebase> {
        self.codebases.iter().map(|c| c.clone()).collect()
    }

    /// Number of registered codebases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codebases.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codebases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::InMemoryEventLog;

    fn registry() -> CodebaseRegistry {
        CodebaseRegistry::new(InMemoryEventLog::shared())
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let reg = registry();
        reg.register("fe", "Frontend", "/work/fe", None, None)
            .await
            .unwrap();
        let codebase = reg.get("fe").unwrap();
        assert_eq!(codebase.name, "Frontend");
    }

    #[tokio::test]
    async fn duplicate_workspace_path_is_rejected() {
        let reg = registry();
        reg.register("fe", "Frontend", "/work/shared", None, None)
            .await
            .unwrap();
        let err = reg
            .register("be", "Backend", "/work/shared", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::Internal(_)));
    }

    #[tokio::test]
    async fn add_dependency_requires_known_codebases() {
        let reg = registry();
        reg.register("fe", "Frontend", "/work/fe", None, None)
            .await
            .unwrap();
        let err = reg
            .add_dependency("fe", "missing", "imports", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::UnknownCodebase(_)));
    }

    #[tokio::test]
    async fn dependency_cycles_are_permitted() {
        let reg = registry();
        reg.register("fe", "Frontend", "/work/fe", None, None)
            .await
            .unwrap();
        reg.register("be", "Backend", "/work/be", None, None)
            .await
            .unwrap();
        reg.add_dependency("fe", "be", "imports", None).await.unwrap();
        reg.add_dependency("be", "fe", "imports", None).await.unwrap();
        assert_eq!(reg.get("fe").unwrap().dependencies.len(), 1);
        assert_eq!(reg.get("be").unwrap().dependencies.len(), 1);
    }
}
