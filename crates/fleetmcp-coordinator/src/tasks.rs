//! Task Registry (C6): authoritative task store, assignment algorithm,
//! file-lock arbitration, and the task board. The central engineering of
//! the coordinator: every other component either feeds it (Agent Registry
//! candidates, Codebase Registry scoping) or is fed by it (Router auto-task
//! pre/post touch).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::AgentRegistry;
use crate::codebases::CodebaseRegistry;
use crate::error::{CoordError, ServerResult};
use crate::event_log::{streams, EventKind, EventLog};

/// Stable task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority. Declaration order is significant: derived `Ord` makes
/// `Urgent` the greatest value, matching the `urgent > high > normal > low`
/// dispatch order the Inbox enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Lowest dispatch priority.
    Low,
    /// Default priority when unspecified.
    Normal,
    /// Above normal.
    High,
    /// Dispatched ahead of every other bucket.
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Task lifecycle state, per the state machine in the task registry's
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Initial state; no assignee yet, or assignee unreachable.
    Pending,
    /// An agent has been selected but has not yet started the task.
    Assigned,
    /// The assignee is actively working; file locks (if any) are held.
    InProgress,
    /// A file-lock conflict prevented entry to `InProgress`.
    Blocked,
    /// Terminal: finished successfully.
    Completed,
    /// Terminal: finished unsuccessfully or cancelled.
    Failed,
}

/// Caller-supplied fields for `create_task`.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Short human title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Dispatch priority.
    pub priority: Priority,
    /// Capabilities an assignee must possess (subset match).
    pub required_capabilities: Vec<String>,
    /// Codebase this task is scoped to, if any.
    pub codebase_id: Option<String>,
    /// Paths this task will touch; participates in lock arbitration.
    pub file_paths: Vec<String>,
}

/// A task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable id.
    pub id: TaskId,
    /// Short human title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Dispatch priority.
    pub priority: Priority,
    /// Capabilities an assignee must possess.
    pub required_capabilities: Vec<String>,
    /// Codebase this task is scoped to, if any.
    pub codebase_id: Option<String>,
    /// Paths this task touches.
    pub file_paths: Vec<String>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Assigned agent, if any.
    pub assignee: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Assignment timestamp.
    pub assigned_at: Option<DateTime<Utc>>,
    /// Start-of-work timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether the Router synthesized this task from a raw tool call.
    pub auto_generated: bool,
    /// The tool name that triggered synthesis, when `auto_generated`.
    pub source_tool_name: Option<String>,
}

/// Coordination strategy for a cross-codebase task's dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossCodebaseStrategy {
    /// Dependents become eligible only once the primary reaches `InProgress`.
    Sequential,
    /// All tasks become eligible immediately.
    Parallel,
}

/// Caller-supplied fields for `create_cross_codebase_task`.
#[derive(Debug, Clone)]
pub struct CrossCodebaseSpec {
    /// Short human title shared by the primary and its dependents.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Codebase the primary task is scoped to.
    pub primary_codebase_id: String,
    /// Every codebase this unit of work touches (includes the primary).
    pub affected_codebases: Vec<String>,
    /// Sequencing strategy.
    pub strategy: CrossCodebaseStrategy,
}

/// Result of a successful `create_task` / `create_cross_codebase_task` call.
#[derive(Debug, Clone, Serialize)]
pub struct TaskCreationResult {
    /// Newly created task id.
    pub task_id: TaskId,
    /// Agent the task landed on, if the assignment algorithm found one.
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossCodebaseCreationResult {
    pub primary_task_id: TaskId,
    pub dependent_task_ids: Vec<TaskId>,
}

/// A row in `get_task_board`'s agent summary.
#[derive(Debug, Clone, Serialize)]
pub struct BoardAgentEntry {
    pub agent_id: String,
    pub current_task: Option<TaskId>,
    pub completed_count: u64,
    pub failed_count: u64,
}

/// Full task board snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TaskBoard {
    pub agents: Vec<BoardAgentEntry>,
    pub pending: Vec<Task>,
}

/// Default number of completed tasks retained per codebase on the in-memory
/// board (decided Open Question #3).
pub const COMPLETED_RETENTION: usize = 200;

/// Canonicalize a path for lock-table comparison: resolve `.`/`..` segments,
/// collapse repeated slashes, and lowercase on case-insensitive systems.
/// Does not touch the filesystem — paths may not exist yet.
#[must_use]
pub fn canonical_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    let normalized = if path.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    };

    #[cfg(any(target_os = "windows", target_os = "macos"))]
    {
        normalized.to_lowercase()
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        normalized
    }
}

struct LockTable {
    /// Canonical path -> holding task id.
    held: HashMap<String, TaskId>,
}

impl LockTable {
    fn new() -> Self {
        Self {
            held: HashMap::new(),
        }
    }

    /// Attempt to acquire every path for `task_id`. All-or-nothing: if any
    /// path is already held by a different task, nothing is acquired and
    /// the holder of the first conflicting path is returned.
    fn try_acquire(&mut self, task_id: &TaskId, paths: &[String]) -> Result<(), TaskId> {
        let canonical: Vec<String> = paths.iter().map(|p| canonical_path(p)).collect();

        for path in &canonical {
            if let Some(holder) = self.held.get(path) {
                if holder != task_id {
                    return Err(holder.clone());
                }
            }
        }

        for path in canonical {
            self.held.insert(path, task_id.clone());
        }

        Ok(())
    }

    fn release(&mut self, task_id: &TaskId) {
        self.held.retain(|_, holder| holder != task_id);
    }
}

/// Owns the task table, the global file-lock table, and drives assignment
/// and lock arbitration.
pub struct TaskRegistry {
    tasks: DashMap<TaskId, Task>,
    /// FIFO of blocked task ids awaiting a re-attempt, in priority+FIFO order.
    blocked_queue: Mutex<VecDeque<TaskId>>,
    locks: Mutex<LockTable>,
    agents: Arc<AgentRegistry>,
    codebases: Arc<CodebaseRegistry>,
    event_log: Arc<dyn EventLog>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("task_count", &self.tasks.len())
            .finish()
    }
}

impl TaskRegistry {
    /// Create a registry bound to the given Agent Registry, Codebase
    /// Registry, and Event Log.
    #[must_use]
    pub fn new(
        agents: Arc<AgentRegistry>,
        codebases: Arc<CodebaseRegistry>,
        event_log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            tasks: DashMap::new(),
            blocked_queue: Mutex::new(VecDeque::new()),
            locks: Mutex::new(LockTable::new()),
            agents,
            codebases,
            event_log,
        }
    }

    fn new_task(&self, spec: TaskSpec, auto_generated: bool, source_tool_name: Option<String>) -> Task {
        Task {
            id: TaskId::new(),
            title: spec.title,
            description: spec.description,
            priority: spec.priority,
            required_capabilities: spec.required_capabilities,
            codebase_id: spec.codebase_id,
            file_paths: spec.file_paths,
            state: TaskState::Pending,
            assignee: None,
            created_at: Utc::now(),
            assigned_at: None,
            started_at: None,
            completed_at: None,
            auto_generated,
            source_tool_name,
        }
    }

    /// Create a task and attempt immediate assignment.
    pub async fn create_task(&self, spec: TaskSpec) -> ServerResult<TaskCreationResult> {
        if let Some(codebase_id) = &spec.codebase_id {
            if !self.codebases.contains(codebase_id) {
                return Err(CoordError::UnknownCodebase(codebase_id.clone()));
            }
        }

        let task = self.new_task(spec, false, None);
        let task_id = task.id.clone();
        self.tasks.insert(task_id.clone(), task);

        self.event_log
            .append(
                streams::TASKS,
                EventKind::TaskCreated,
                serde_json::json!({"task_id": task_id.0}),
                None,
            )
            .await?;

        let assigned_to = self.try_assign(&task_id).await?;
        Ok(TaskCreationResult {
            task_id,
            assigned_to,
        })
    }

    /// Create a cross-codebase task: a primary plus one dependent per
    /// affected codebase other than the primary's own.
    pub async fn create_cross_codebase_task(
        &self,
        spec: CrossCodebaseSpec,
    ) -> ServerResult<CrossCodebaseCreationResult> {
        for codebase_id in std::iter::once(&spec.primary_codebase_id).chain(spec.affected_codebases.iter())
        {
            if !self.codebases.contains(codebase_id) {
                return Err(CoordError::UnknownCodebase(codebase_id.clone()));
            }
        }

        let primary = self.new_task(
            TaskSpec {
                title: spec.title.clone(),
                description: spec.description.clone(),
                priority: Priority::Normal,
                required_capabilities: Vec::new(),
                codebase_id: Some(spec.primary_codebase_id.clone()),
                file_paths: Vec::new(),
            },
            false,
            None,
        );
        let primary_task_id = primary.id.clone();
        self.tasks.insert(primary_task_id.clone(), primary);
        self.event_log
            .append(
                streams::TASKS,
                EventKind::TaskCreated,
                serde_json::json!({"task_id": primary_task_id.0, "cross_codebase": true}),
                None,
            )
            .await?;
        self.try_assign(&primary_task_id).await?;

        let mut dependent_task_ids = Vec::new();
        for codebase_id in spec
            .affected_codebases
            .iter()
            .filter(|c| **c != spec.primary_codebase_id)
        {
            let dependent = self.new_task(
                TaskSpec {
                    title: spec.title.clone(),
                    description: spec.description.clone(),
                    priority: Priority::Normal,
                    required_capabilities: Vec::new(),
                    codebase_id: Some(codebase_id.clone()),
                    file_paths: Vec::new(),
                },
                false,
                None,
            );
            let dependent_id = dependent.id.clone();
            self.tasks.insert(dependent_id.clone(), dependent);
            self.event_log
                .append(
                    streams::TASKS,
                    EventKind::TaskCreated,
                    serde_json::json!({"task_id": dependent_id.0, "dependent_of": primary_task_id.0}),
                    None,
                )
                .await?;

            if spec.strategy == CrossCodebaseStrategy::Parallel {
                self.try_assign(&dependent_id).await?;
            }
            // Sequential dependents stay `pending`/unassigned until the
            // primary reaches `InProgress`; `promote_sequential_dependents`
            // below handles that transition.
            dependent_task_ids.push(dependent_id);
        }

        Ok(CrossCodebaseCreationResult {
            primary_task_id,
            dependent_task_ids,
        })
    }

    /// Deterministic assignment: build the candidate set and tie-break as
    /// specified, then enqueue onto the winner's inbox and mark `Assigned`.
    async fn try_assign(&self, task_id: &TaskId) -> ServerResult<Option<String>> {
        let Some(task) = self.tasks.get(task_id).map(|t| t.clone()) else {
            return Ok(None);
        };
        if task.state != TaskState::Pending {
            return Ok(task.assignee);
        }

        let candidates = self
            .agents
            .candidates(&task.required_capabilities, task.codebase_id.as_deref());
        let Some(winner) = candidates.into_iter().min_by(|a, b| {
            a.pending_count
                .cmp(&b.pending_count)
                .then_with(|| b.last_heartbeat.cmp(&a.last_heartbeat))
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        }) else {
            return Ok(None);
        };

        self.agents
            .enqueue_task(&winner.agent_id, task_id.clone(), task.priority)?;

        if let Some(mut entry) = self.tasks.get_mut(task_id) {
            entry.state = TaskState::Assigned;
            entry.assignee = Some(winner.agent_id.clone());
            entry.assigned_at = Some(Utc::now());
        }

        self.event_log
            .append(
                streams::TASKS,
                EventKind::TaskAssigned,
                serde_json::json!({"task_id": task_id.0, "agent_id": winner.agent_id}),
                None,
            )
            .await?;

        Ok(Some(winner.agent_id))
    }

    /// `get_next_task`: promote the agent's inbox head into the in-progress
    /// slot and attempt file-lock acquisition.
    pub async fn get_next(&self, agent_id: &str) -> ServerResult<Option<Task>> {
        if !self.agents.is_known(agent_id) {
            return Err(CoordError::UnknownAgent(agent_id.to_string()));
        }

        let Some(task_id) = self.agents.take_next(agent_id)? else {
            return Ok(None);
        };

        self.start_task(&task_id, agent_id).await?;
        Ok(self.tasks.get(&task_id).map(|t| t.clone()))
    }

    async fn start_task(&self, task_id: &TaskId, agent_id: &str) -> ServerResult<()> {
        let locks_needed = self
            .tasks
            .get(task_id)
            .map(|t| (t.auto_generated, t.file_paths.clone()))
            .unwrap_or((true, Vec::new()));

        // Open Question #1: auto-generated tasks never participate in lock
        // arbitration, only explicit `file_paths` on user-created tasks do.
        let (auto_generated, file_paths) = locks_needed;
        let wants_locks = !auto_generated && !file_paths.is_empty();

        if wants_locks {
            let acquired = self.locks.lock().try_acquire(task_id, &file_paths);
            match acquired {
                Ok(()) => {
                    for path in &file_paths {
                        self.event_log
                            .append(
                                streams::TASKS,
                                EventKind::FileLocked,
                                serde_json::json!({"task_id": task_id.0, "path": path}),
                                None,
                            )
                            .await?;
                    }
                    if let Some(mut entry) = self.tasks.get_mut(task_id) {
                        entry.state = TaskState::InProgress;
                        entry.started_at = Some(Utc::now());
                    }
                    self.event_log
                        .append(
                            streams::TASKS,
                            EventKind::TaskStarted,
                            serde_json::json!({"task_id": task_id.0, "agent_id": agent_id}),
                            None,
                        )
                        .await?;
                }
                Err(_holder) => {
                    if let Some(mut entry) = self.tasks.get_mut(task_id) {
                        entry.state = TaskState::Blocked;
                    }
                    self.blocked_queue.lock().push_back(task_id.clone());
                }
            }
        } else {
            if let Some(mut entry) = self.tasks.get_mut(task_id) {
                entry.state = TaskState::InProgress;
                entry.started_at = Some(Utc::now());
            }
            self.event_log
                .append(
                    streams::TASKS,
                    EventKind::TaskStarted,
                    serde_json::json!({"task_id": task_id.0, "agent_id": agent_id}),
                    None,
                )
                .await?;
        }

        let reached_in_progress = self
            .tasks
            .get(task_id)
            .map(|t| t.state == TaskState::InProgress)
            .unwrap_or(false);
        if reached_in_progress {
            self.promote_sequential_dependents(task_id).await?;
        }
        Ok(())
    }

    /// If `task_id` is a cross-codebase primary reaching `InProgress`,
    /// sequential dependents scoped to other codebases become eligible for
    /// assignment now. Dependents were left `Pending` with no assignment
    /// attempt at creation time; this walks every codebase touched by
    /// `task_id`'s sibling dependents (any codebase other than the task's
    /// own) and retries assignment for tasks still `Pending` there.
    async fn promote_sequential_dependents(&self, task_id: &TaskId) -> ServerResult<()> {
        let Some(codebase_id) = self.tasks.get(task_id).and_then(|t| t.codebase_id.clone()) else {
            return Ok(());
        };
        let other_codebases: Vec<String> = self
            .codebases
            .list()
            .into_iter()
            .map(|c| c.id)
            .filter(|id| *id != codebase_id)
            .collect();
        for other in other_codebases {
            self.retry_pending_for_codebase(&other).await?;
        }
        Ok(())
    }

    /// Re-attempt assignment for every still-pending task scoped to
    /// `codebase_id`. Used after a cross-codebase primary starts, to make
    /// its sequential dependents eligible.
    pub async fn retry_pending_for_codebase(&self, codebase_id: &str) -> ServerResult<()> {
        let pending_ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.state == TaskState::Pending && t.codebase_id.as_deref() == Some(codebase_id))
            .map(|t| t.id.clone())
            .collect();
        for task_id in pending_ids {
            self.try_assign(&task_id).await?;
        }
        Ok(())
    }

    /// `complete_task`.
    pub async fn complete(&self, agent_id: &str, _result: serde_json::Value) -> ServerResult<()> {
        let task_id = self.agents.complete_current(agent_id)?;
        self.finish(&task_id, TaskState::Completed).await
    }

    /// Mark the agent's current task failed (used by auto-task post-touch
    /// on backend error, and by an explicit `fail` path).
    pub async fn fail(&self, agent_id: &str, _reason: impl Into<String>) -> ServerResult<()> {
        let task_id = self.agents.fail_current(agent_id)?;
        self.finish(&task_id, TaskState::Failed).await
    }

    async fn finish(&self, task_id: &TaskId, terminal: TaskState) -> ServerResult<()> {
        let had_locks = self
            .tasks
            .get(task_id)
            .map(|t| t.state == TaskState::InProgress && !t.auto_generated && !t.file_paths.is_empty())
            .unwrap_or(false);

        if let Some(mut entry) = self.tasks.get_mut(task_id) {
            entry.state = terminal;
            entry.completed_at = Some(Utc::now());
        }

        let kind = if terminal == TaskState::Completed {
            EventKind::TaskCompleted
        } else {
            EventKind::TaskFailed
        };
        self.event_log
            .append(streams::TASKS, kind, serde_json::json!({"task_id": task_id.0}), None)
            .await?;

        if terminal == TaskState::Completed {
            self.evict_old_completed(task_id);
        }

        if had_locks {
            let released_paths: Vec<String> = self
                .tasks
                .get(task_id)
                .map(|t| t.file_paths.clone())
                .unwrap_or_default();
            self.locks.lock().release(task_id);
            for path in released_paths {
                self.event_log
                    .append(
                        streams::TASKS,
                        EventKind::FileUnlocked,
                        serde_json::json!({"task_id": task_id.0, "path": path}),
                        None,
                    )
                    .await?;
            }
            self.retry_blocked().await?;
        }

        Ok(())
    }

    /// Keep only the most recent [`COMPLETED_RETENTION`] completed tasks per
    /// codebase on the in-memory board (Open Question #3); the Event Log
    /// keeps the unbounded durable record regardless.
    fn evict_old_completed(&self, just_completed: &TaskId) {
        let codebase_id = self.tasks.get(just_completed).and_then(|t| t.codebase_id.clone());

        let mut completed: Vec<(TaskId, DateTime<Utc>)> = self
            .tasks
            .iter()
            .filter(|t| t.state == TaskState::Completed && t.codebase_id == codebase_id)
            .map(|t| (t.id.clone(), t.completed_at.unwrap_or(t.created_at)))
            .collect();
        if completed.len() <= COMPLETED_RETENTION {
            return;
        }
        completed.sort_by_key(|(_, completed_at)| *completed_at);
        let overflow = completed.len() - COMPLETED_RETENTION;
        for (task_id, _) in completed.into_iter().take(overflow) {
            self.tasks.remove(&task_id);
        }
    }

    /// Re-attempt every blocked task, in priority+FIFO order, after a lock
    /// release.
    async fn retry_blocked(&self) -> ServerResult<()> {
        let waiting: Vec<TaskId> = {
            let mut queue = self.blocked_queue.lock();
            std::mem::take(&mut *queue).into_iter().collect()
        };

        for task_id in waiting {
            let Some(task) = self.tasks.get(&task_id).map(|t| t.clone()) else {
                continue;
            };
            if task.state != TaskState::Blocked {
                continue;
            }
            let Some(assignee) = task.assignee.clone() else {
                continue;
            };
            self.start_task(&task_id, &assignee).await?;
        }
        Ok(())
    }

    /// Synthesize or refresh the agent's auto-task for a raw tool call, per
    /// the Router's auto-task pre-touch step. No-op if the agent already has
    /// a `current` task.
    pub async fn update_activity(&self, agent_id: &str, tool_name: &str, hint: Option<&str>) -> ServerResult<()> {
        if self.agents.current_task(agent_id).is_some() {
            return Ok(());
        }

        let title = synthesize_title(tool_name, hint);
        let spec = TaskSpec {
            title,
            description: format!("Auto-tracked activity for {tool_name}"),
            priority: Priority::Normal,
            required_capabilities: Vec::new(),
            codebase_id: None,
            file_paths: Vec::new(),
        };
        let task = self.new_task(spec, true, Some(tool_name.to_string()));
        let task_id = task.id.clone();
        self.tasks.insert(task_id.clone(), task);

        self.agents.enqueue_task(agent_id, task_id.clone(), Priority::Normal)?;
        if let Some(mut entry) = self.tasks.get_mut(&task_id) {
            entry.state = TaskState::Assigned;
            entry.assignee = Some(agent_id.to_string());
            entry.assigned_at = Some(Utc::now());
        }
        self.agents.take_next(agent_id)?;
        if let Some(mut entry) = self.tasks.get_mut(&task_id) {
            entry.state = TaskState::InProgress;
            entry.started_at = Some(Utc::now());
        }

        self.event_log
            .append(
                streams::TASKS,
                EventKind::TaskStarted,
                serde_json::json!({"task_id": task_id.0, "agent_id": agent_id, "auto_generated": true}),
                None,
            )
            .await?;

        Ok(())
    }

    /// `get_task_board`.
    #[must_use]
    pub fn get_board(&self) -> TaskBoard {
        let agents = self
            .agents
            .board_entries()
            .into_iter()
            .map(|(agent_id, current_task, completed_count, failed_count)| BoardAgentEntry {
                agent_id,
                current_task,
                completed_count,
                failed_count,
            })
            .collect();

        let mut pending: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.state == TaskState::Pending)
            .map(|t| t.clone())
            .collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

        TaskBoard { agents, pending }
    }

    /// Fetch a task by id.
    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<Task> {
        self.tasks.get(task_id).map(|t| t.clone())
    }

    /// Count of tasks scoped to `codebase_id` currently in a non-terminal
    /// state, for `get_codebase_status`.
    #[must_use]
    pub fn active_count_for_codebase(&self, codebase_id: &str) -> usize {
        self.tasks
            .iter()
            .filter(|t| {
                t.codebase_id.as_deref() == Some(codebase_id)
                    && !matches!(t.state, TaskState::Completed | TaskState::Failed)
            })
            .count()
    }
}

/// Derive an auto-task title from a raw tool call, per the heuristics in the
/// Task Registry's auto-task synthesis contract.
#[must_use]
pub fn synthesize_title(tool_name: &str, hint: Option<&str>) -> String {
    let Some(hint) = hint else {
        return format!("Using {tool_name}");
    };

    let looks_path_like = hint.contains('/') || hint.contains('\\') || hint.rsplit('.').next().map(|ext| ext.len() <= 4 && ext != hint).unwrap_or(false);

    if looks_path_like {
        let basename = hint.rsplit(['/', '\\']).next().unwrap_or(hint);
        if tool_name.contains("write") || tool_name.contains("edit") {
            format!("Editing {basename}")
        } else {
            format!("Reading file: {basename}")
        }
    } else if tool_name.contains("search") || tool_name.contains("research") || tool_name.contains("docs") {
        format!("Researching: {hint}")
    } else {
        format!("Using {tool_name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::InMemoryEventLog;

    fn setup() -> (Arc<AgentRegistry>, Arc<CodebaseRegistry>, TaskRegistry) {
        let event_log = InMemoryEventLog::shared();
        let agents = Arc::new(AgentRegistry::new(event_log.clone()));
        let codebases = Arc::new(CodebaseRegistry::new(event_log.clone()));
        let tasks = TaskRegistry::new(agents.clone(), codebases.clone(), event_log);
        (agents, codebases, tasks)
    }

    #[tokio::test]
    async fn overlapping_file_paths_block_second_task() {
        let (agents, _codebases, tasks) = setup();
        agents
            .register("CoderBlueKoala".into(), vec!["coding".into()], None, false)
            .await
            .unwrap();
        agents
            .register("CoderRedFox".into(), vec!["coding".into()], None, false)
            .await
            .unwrap();

        let t1 = tasks
            .create_task(TaskSpec {
                title: "fix auth".into(),
                description: String::new(),
                priority: Priority::Normal,
                required_capabilities: vec!["coding".into()],
                codebase_id: None,
                file_paths: vec!["/src/a.ts".into()],
            })
            .await
            .unwrap();
        let t2 = tasks
            .create_task(TaskSpec {
                title: "fmt a".into(),
                description: String::new(),
                priority: Priority::Normal,
                required_capabilities: vec!["coding".into()],
                codebase_id: None,
                file_paths: vec!["/src/a.ts".into()],
            })
            .await
            .unwrap();

        let agent1 = t1.assigned_to.unwrap();
        let agent2 = t2.assigned_to.unwrap();
        assert_ne!(agent1, agent2);

        tasks.get_next(&agent1).await.unwrap();
        tasks.get_next(&agent2).await.unwrap();

        assert_eq!(tasks.get(&t1.task_id).unwrap().state, TaskState::InProgress);
        assert_eq!(tasks.get(&t2.task_id).unwrap().state, TaskState::Blocked);

        tasks.complete(&agent1, serde_json::json!({})).await.unwrap();
        tasks.get_next(&agent2).await.unwrap();
        assert_eq!(tasks.get(&t2.task_id).unwrap().state, TaskState::InProgress);
    }

    #[tokio::test]
    async fn capability_mismatch_stays_pending() {
        let (agents, _codebases, tasks) = setup();
        agents
            .register("Solo".into(), vec!["coding".into()], None, false)
            .await
            .unwrap();

        let result = tasks
            .create_task(TaskSpec {
                title: "needs testing".into(),
                description: String::new(),
                priority: Priority::Normal,
                required_capabilities: vec!["testing".into()],
                codebase_id: None,
                file_paths: Vec::new(),
            })
            .await
            .unwrap();

        assert!(result.assigned_to.is_none());
        let board = tasks.get_board();
        assert_eq!(board.pending.len(), 1);
    }

    #[test]
    fn canonical_path_resolves_dot_segments() {
        assert_eq!(canonical_path("/src/../src/./a.ts"), "/src/a.ts");
    }

    #[test]
    fn title_synthesis_prefers_path_heuristic() {
        assert_eq!(
            synthesize_title("mcp_filesystem_read_file", Some("/w/lib/x.ex")),
            "Reading file: x.ex"
        );
    }

    #[test]
    fn title_synthesis_falls_back_to_tool_name() {
        assert_eq!(synthesize_title("some_tool", None), "Using some_tool");
    }
}
