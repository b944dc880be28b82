//! Agent Registry (C3): known agents, capabilities, heartbeat/staleness
//! tracking, and each agent's Inbox (C4).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{CoordError, ServerResult};
use crate::event_log::{streams, EventKind, EventLog};
use crate::inbox::Inbox;
use crate::session::SessionManager;
use crate::tasks::{Priority, TaskId};

/// Agent lifecycle state, per the data model's invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Just registered, no task taken yet.
    Registered,
    /// Inbox has a current task.
    Working,
    /// No current task, heartbeat within threshold.
    Idle,
    /// `now - last_heartbeat > stale_threshold`.
    Stale,
    /// Explicitly unregistered; retained only for audit, excluded from
    /// candidate selection.
    Unregistered,
}

/// A known agent.
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    /// Stable id: `<slugified-name>-<random-suffix>`.
    pub id: String,
    /// Human-supplied name, unique across live registrations.
    pub name: String,
    /// Ordered capability tags, e.g. `["coding", "testing"]`.
    pub capabilities: Vec<String>,
    /// Home codebase, if any.
    pub codebase_id: Option<String>,
    /// Whether this agent may take tasks scoped to codebases other than its
    /// home codebase.
    pub cross_codebase_capable: bool,
    /// Last heartbeat timestamp.
    pub last_heartbeat: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: AgentState,
}

/// A candidate for task assignment, as surfaced to the Task Registry.
#[derive(Debug, Clone)]
pub struct AgentCandidate {
    /// Candidate's agent id.
    pub agent_id: String,
    /// Number of pending (not yet in-progress) tasks in this agent's inbox.
    pub pending_count: usize,
    /// Last heartbeat, used for the "prefer idle" tie-break.
    pub last_heartbeat: DateTime<Utc>,
}

struct AgentEntry {
    agent: Agent,
    inbox: Inbox,
}

/// Owns the agent table and every agent's inbox. `stale_threshold` and
/// `heartbeat_interval` are read by the background staleness tick
/// ([`spawn_staleness_tick`]).
pub struct AgentRegistry {
    agents: DashMap<String, Mutex<AgentEntry>>,
    /// name -> id, for idempotent-on-name registration.
    by_name: DashMap<String, String>,
    sessions: Arc<SessionManager>,
    event_log: Arc<dyn EventLog>,
    stale_threshold: Duration,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agent_count", &self.agents.len())
            .finish()
    }
}

/// Result of `register_agent`.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResult {
    /// The agent's stable id.
    pub agent_id: String,
    /// Freshly minted session token.
    pub session_token: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

impl AgentRegistry {
    /// Create a registry with the given stale threshold, backed by
    /// `event_log` and a fresh [`SessionManager`] with a 24h default TTL.
    #[must_use]
    pub fn new(event_log: Arc<dyn EventLog>) -> Self {
        Self::with_stale_threshold(event_log, Duration::from_secs(90))
    }

    /// Create a registry with an explicit stale threshold.
    #[must_use]
    pub fn with_stale_threshold(event_log: Arc<dyn EventLog>, stale_threshold: Duration) -> Self {
        Self {
            agents: DashMap::new(),
            by_name: DashMap::new(),
            sessions: Arc::new(SessionManager::new(Duration::from_secs(24 * 60 * 60))),
            event_log,
            stale_threshold,
        }
    }

    /// The session manager backing this registry's tokens, shared so the
    /// Router can validate presented tokens against the same table.
    #[must_use]
    pub fn sessions(&self) -> Arc<SessionManager> {
        self.sessions.clone()
    }

    /// `register_agent`. Idempotent on `name`: re-registration of a known
    /// name reuses the id, issues a fresh session, and resets
    /// `last_heartbeat`.
    pub async fn register(
        &self,
        name: String,
        capabilities: Vec<String>,
        codebase_id: Option<String>,
        cross_codebase_capable: bool,
    ) -> ServerResult<RegistrationResult> {
        let id = if let Some(existing_id) = self.by_name.get(&name).map(|e| e.clone()) {
            existing_id
        } else {
            let suffix = &Uuid::new_v4().simple().to_string()[..8];
            let slug = name.to_lowercase().replace(' ', "-");
            format!("{slug}-{suffix}")
        };

        self.by_name.insert(name.clone(), id.clone());

        let agent = Agent {
            id: id.clone(),
            name,
            capabilities,
            codebase_id,
            cross_codebase_capable,
            last_heartbeat: Utc::now(),
            state: AgentState::Registered,
        };

        let inbox = self
            .agents
            .get(&id)
            .map(|existing| {
                let mut guard = existing.lock();
                std::mem::take(&mut guard.inbox)
            })
            .unwrap_or_default();

        self.agents.insert(id.clone(), Mutex::new(AgentEntry { agent, inbox }));

        let (session_token, expires_at) = self.sessions.create_session(id.clone(), None)?;

        self.event_log
            .append(
                streams::AGENTS,
                EventKind::AgentRegistered,
                serde_json::json!({"agent_id": id}),
                Some(id.clone()),
            )
            .await?;

        Ok(RegistrationResult {
            agent_id: id,
            session_token,
            expires_at,
        })
    }

    /// `unregister_agent`: revoke sessions and mark the entry
    /// [`AgentState::Unregistered`]. The entry is retained (for audit and
    /// board history) but excluded from candidate selection and from
    /// `by_name` lookups, so a later `register_agent` with the same name
    /// mints a fresh id.
    pub async fn unregister(&self, agent_id: &str) -> ServerResult<()> {
        let Some(entry) = self.agents.get(agent_id) else {
            return Err(CoordError::UnknownAgent(agent_id.to_string()));
        };
        {
            let mut guard = entry.lock();
            guard.agent.state = AgentState::Unregistered;
            self.by_name.remove(&guard.agent.name);
        }
        self.sessions.revoke_agent(agent_id);

        self.event_log
            .append(
                streams::AGENTS,
                EventKind::AgentUnregistered,
                serde_json::json!({"agent_id": agent_id}),
                Some(agent_id.to_string()),
            )
            .await?;

        Ok(())
    }

    /// `heartbeat`: refresh `last_heartbeat` and clear `Stale`/`Idle` into
    /// whichever state the current task occupancy implies. Idempotent.
    pub async fn heartbeat(&self, agent_id: &str) -> ServerResult<DateTime<Utc>> {
        let Some(entry) = self.agents.get(agent_id) else {
            return Err(CoordError::UnknownAgent(agent_id.to_string()));
        };
        let now = Utc::now();
        {
            let mut guard = entry.lock();
            guard.agent.last_heartbeat = now;
            guard.agent.state = if guard.inbox.current().is_some() {
                AgentState::Working
            } else {
                AgentState::Idle
            };
        }

        self.event_log
            .append(
                streams::AGENTS,
                EventKind::Heartbeat,
                serde_json::json!({"agent_id": agent_id}),
                Some(agent_id.to_string()),
            )
            .await?;

        Ok(now)
    }

    /// Whether `agent_id` is a known (registered, not-yet-unregistered)
    /// entry.
    #[must_use]
    pub fn is_known(&self, agent_id: &str) -> bool {
        self.agents
            .get(agent_id)
            .map(|e| e.lock().agent.state != AgentState::Unregistered)
            .unwrap_or(false)
    }

    /// Snapshot of a single agent.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<Agent> {
        self.agents.get(agent_id).map(|e| e.lock().agent.clone())
    }

    /// Snapshot of every known agent (including unregistered, for audit
    /// views; candidate selection filters separately).
    #[must_use]
    pub fn list(&self) -> Vec<Agent> {
        self.agents.iter().map(|e| e.lock().agent.clone()).collect()
    }

    /// Build the Task Registry's candidate set for `required` capabilities,
    /// optionally scoped to `codebase_id`.
    #[must_use]
    pub fn candidates(&self, required: &[String], codebase_id: Option<&str>) -> Vec<AgentCandidate> {
        self.agents
            .iter()
            .filter_map(|entry| {
                let guard = entry.lock();
                if guard.agent.state == AgentState::Unregistered || guard.agent.state == AgentState::Stale {
                    return None;
                }
                if !required.iter().all(|cap| guard.agent.capabilities.contains(cap)) {
                    return None;
                }
                if guard.inbox.current().is_some() {
                    return None;
                }
                if let Some(codebase_id) = codebase_id {
                    let belongs = guard.agent.codebase_id.as_deref() == Some(codebase_id);
                    if !belongs && !guard.agent.cross_codebase_capable {
                        return None;
                    }
                }
                Some(AgentCandidate {
                    agent_id: guard.agent.id.clone(),
                    pending_count: guard.inbox.pending_len(),
                    last_heartbeat: guard.agent.last_heartbeat,
                })
            })
            .collect()
    }

    /// Enqueue a task id onto `agent_id`'s inbox.
    pub fn enqueue_task(&self, agent_id: &str, task_id: TaskId, priority: Priority) -> ServerResult<()> {
        let entry = self
            .agents
            .get(agent_id)
            .ok_or_else(|| CoordError::UnknownAgent(agent_id.to_string()))?;
        entry.lock().inbox.enqueue(task_id, priority)
    }

    /// `get_next_task`'s inbox half: promote the head into `current`.
    pub fn take_next(&self, agent_id: &str) -> ServerResult<Option<TaskId>> {
        let entry = self
            .agents
            .get(agent_id)
            .ok_or_else(|| CoordError::UnknownAgent(agent_id.to_string()))?;
        let mut guard = entry.lock();
        let next = guard.inbox.take_next()?;
        if next.is_some() {
            guard.agent.state = AgentState::Working;
        }
        Ok(next)
    }

    /// The agent's current in-progress task, if any.
    #[must_use]
    pub fn current_task(&self, agent_id: &str) -> Option<TaskId> {
        self.agents
            .get(agent_id)
            .and_then(|e| e.lock().inbox.current().cloned())
    }

    /// Complete the agent's current task.
    pub fn complete_current(&self, agent_id: &str) -> ServerResult<TaskId> {
        let entry = self
            .agents
            .get(agent_id)
            .ok_or_else(|| CoordError::UnknownAgent(agent_id.to_string()))?;
        let mut guard = entry.lock();
        let task_id = guard.inbox.complete()?;
        guard.agent.state = AgentState::Idle;
        Ok(task_id)
    }

    /// Fail the agent's current task.
    pub fn fail_current(&self, agent_id: &str) -> ServerResult<TaskId> {
        let entry = self
            .agents
            .get(agent_id)
            .ok_or_else(|| CoordError::UnknownAgent(agent_id.to_string()))?;
        let mut guard = entry.lock();
        let task_id = guard.inbox.fail()?;
        guard.agent.state = AgentState::Idle;
        Ok(task_id)
    }

    /// `(agent_id, current_task, completed_count, failed_count)` for every
    /// known (non-unregistered) agent, for `get_task_board`.
    #[must_use]
    pub fn board_entries(&self) -> Vec<(String, Option<TaskId>, u64, u64)> {
        self.agents
            .iter()
            .filter_map(|entry| {
                let guard = entry.lock();
                if guard.agent.state == AgentState::Unregistered {
                    return None;
                }
                let (completed, failed) = guard.inbox.counters();
                Some((guard.agent.id.clone(), guard.inbox.current().cloned(), completed, failed))
            })
            .collect()
    }

    /// One staleness tick: mark any non-stale, non-unregistered agent whose
    /// `last_heartbeat` is older than `stale_threshold` as `Stale`.
    pub fn tick_staleness(&self) {
        let now = Utc::now();
        let Ok(threshold) = chrono::Duration::from_std(self.stale_threshold) else {
            return;
        };
        for entry in self.agents.iter() {
            let mut guard = entry.lock();
            if guard.agent.state == AgentState::Unregistered {
                continue;
            }
            if now - guard.agent.last_heartbeat > threshold {
                guard.agent.state = AgentState::Stale;
            }
        }
    }
}

/// Spawn the background tick marking stale agents, per the Agent
/// Registry's contract (does not evict, only flags).
pub fn spawn_staleness_tick(
    registry: Arc<AgentRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            registry.tick_staleness();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::InMemoryEventLog;

    fn registry() -> AgentRegistry {
        AgentRegistry::with_stale_threshold(InMemoryEventLog::shared(), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn register_is_idempotent_on_name() {
        let reg = registry();
        let first = reg
            .register("CoderBlueKoala".into(), vec!["coding".into()], None, false)
            .await
            .unwrap();
        let second = reg
            .register("CoderBlueKoala".into(), vec!["coding".into()], None, false)
            .await
            .unwrap();
        assert_eq!(first.agent_id, second.agent_id);
        assert_ne!(first.session_token, second.session_token);
    }

    #[tokio::test]
    async fn stale_threshold_boundary_is_exclusive() {
        let reg = registry();
        let result = reg
            .register("Agent".into(), vec!["coding".into()], None, false)
            .await
            .unwrap();
        reg.tick_staleness();
        assert_eq!(reg.get(&result.agent_id).unwrap().state, AgentState::Registered);

        std::thread::sleep(Duration::from_millis(60));
        reg.tick_staleness();
        assert_eq!(reg.get(&result.agent_id).unwrap().state, AgentState::Stale);
    }

    #[tokio::test]
    async fn capability_subset_match_includes_superset_candidates() {
        let reg = registry();
        reg.register("Agent".into(), vec!["coding".into(), "testing".into()], None, false)
            .await
            .unwrap();
        let candidates = reg.candidates(&["coding".to_string()], None);
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn unregister_excludes_from_candidates_and_by_name() {
        let reg = registry();
        let result = reg
            .register("Agent".into(), vec!["coding".into()], None, false)
            .await
            .unwrap();
        reg.unregister(&result.agent_id).await.unwrap();
        assert!(reg.candidates(&["coding".to_string()], None).is_empty());

        let rereg = reg
            .register("Agent".into(), vec!["coding".into()], None, false)
            .await
            .unwrap();
        assert_ne!(rereg.agent_id, result.agent_id);
    }
}
