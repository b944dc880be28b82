//! Append-only, per-stream ordered domain event log (C1).
//!
//! Modeled as a capability interface (`append` / `subscribe` / `replay_from`)
//! so a file-backed or NATS-JetStream-backed implementation can replace the
//! in-memory one without touching callers. The registries replay their
//! stream from the last checkpoint on startup, then subscribe for live
//! events.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{CoordError, ServerResult};

/// Topic prefixes the coordinator writes to.
pub mod streams {
    /// Agent lifecycle events.
    pub const AGENTS: &str = "coord.events.agents";
    /// Task lifecycle events.
    pub const TASKS: &str = "coord.events.tasks";
    /// Codebase registry events.
    pub const CODEBASES: &str = "coord.events.codebases";
    /// Backend/external-server lifecycle events.
    pub const BACKENDS: &str = "coord.events.backends";
}

/// Domain event kind, per the data model's `Event.kind` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new agent completed registration.
    AgentRegistered,
    /// An agent was explicitly unregistered.
    AgentUnregistered,
    /// An agent's liveness was refreshed.
    Heartbeat,
    /// A task entered the store.
    TaskCreated,
    /// A task was assigned to an agent.
    TaskAssigned,
    /// A task transitioned to in-progress.
    TaskStarted,
    /// A task reached its completed terminal state.
    TaskCompleted,
    /// A task reached its failed terminal state.
    TaskFailed,
    /// A file path was locked by an in-progress task.
    FileLocked,
    /// A file path's lock was released.
    FileUnlocked,
    /// A codebase was registered.
    CodebaseRegistered,
    /// A dependency edge was added between codebases.
    DependencyAdded,
    /// A backend reached the `ready` health state.
    ExternalServerUp,
    /// A backend left the `ready` health state.
    ExternalServerDown,
    /// Two sources published a tool under the same name; the first
    /// registered wins and the loser is dropped from the catalog.
    ToolNameCollision,
}

/// A single durable event record. Sequence numbers are per-stream, strictly
/// monotonic, and gap-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic, per-stream sequence number.
    pub sequence: u64,
    /// Stream this event belongs to (see [`streams`]).
    pub stream: String,
    /// Domain event kind.
    pub kind: EventKind,
    /// Arbitrary structured payload.
    pub payload: serde_json::Value,
    /// Wall-clock time the event was appended.
    pub timestamp: DateTime<Utc>,
    /// Producing agent or session id, if any.
    pub producer: Option<String>,
}

/// Capability interface the Event Log exposes. A file-backed WAL, a
/// streaming-bus client, or (as here) an in-memory implementation can all
/// satisfy it.
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    /// Durably append an event to `stream`, returning its sequence number.
    /// Returns [`CoordError::LogUnavailable`] if the log cannot acknowledge
    /// the write within its bounded retry budget.
    async fn append(
        &self,
        stream: &str,
        kind: EventKind,
        payload: serde_json::Value,
        producer: Option<String>,
    ) -> ServerResult<u64>;

    /// Replay every event on `stream` from (and including) `from_seq`.
    fn replay_from(&self, stream: &str, from_seq: u64) -> Vec<Event>;

    /// Subscribe to new events appended to `stream` from this point forward.
    fn subscribe(&self, stream: &str) -> broadcast::Receiver<Event>;
}

struct StreamState {
    next_seq: u64,
    events: Vec<Event>,
    sender: broadcast::Sender<Event>,
}

impl StreamState {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            next_seq: 1,
            events: Vec::new(),
            sender,
        }
    }
}

/// In-memory Event Log. Process-local, unbounded retention, used for tests
/// and as the default when no durable bus is configured. Reads never fail;
/// writes never fail (there is no external dependency to be unavailable),
/// which is the degenerate but valid case of the `log-unavailable` taxonomy
/// bucket.
pub struct InMemoryEventLog {
    streams: RwLock<HashMap<String, StreamState>>,
}

impl InMemoryEventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Wrap in an `Arc` for sharing across actors.
    #[must_use]
    pub fn shared() -> Arc<dyn EventLog> {
        Arc::new(Self::new())
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(
        &self,
        stream: &str,
        kind: EventKind,
        payload: serde_json::Value,
        producer: Option<String>,
    ) -> ServerResult<u64> {
        let mut streams = self.streams.write();
        let state = streams
            .entry(stream.to_string())
            .or_insert_with(StreamState::new);

        let sequence = state.next_seq;
        state.next_seq += 1;

        let event = Event {
            sequence,
            stream: stream.to_string(),
            kind,
            payload,
            timestamp: Utc::now(),
            producer,
        };

        state.events.push(event.clone());
        // No receivers is not an error: events are still durably retained.
        let _ = state.sender.send(event);

        Ok(sequence)
    }

    fn replay_from(&self, stream: &str, from_seq: u64) -> Vec<Event> {
        self.streams
            .read()
            .get(stream)
            .map(|state| {
                state
                    .events
                    .iter()
                    .filter(|e| e.sequence >= from_seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn subscribe(&self, stream: &str) -> broadcast::Receiver<Event> {
        let mut streams = self.streams.write();
        let state = streams
            .entry(stream.to_string())
            .or_insert_with(StreamState::new);
        state.sender.subscribe()
    }
}

/// Convenience used by call sites that want a `CoordError::LogUnavailable`
/// rather than letting the underlying error's `Display` leak directly.
pub fn unavailable(reason: impl Into<String>) -> CoordError {
    CoordError::LogUnavailable(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_numbers_are_monotonic_and_gap_free() {
        let log = InMemoryEventLog::new();
        let mut seqs = Vec::new();
        for _ in 0..5 {
            let seq = log
                .append(streams::TASKS, EventKind::TaskCreated, serde_json::json!({}), None)
                .await
                .unwrap();
            seqs.push(seq);
        }
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn streams_are_independent() {
        let log = InMemoryEventLog::new();
        log.append(streams::TASKS, EventKind::TaskCreated, serde_json::json!({}), None)
            .await
            .unwrap();
        let seq = log
            .append(
                streams::AGENTS,
                EventKind::AgentRegistered,
                serde_json::json!({}),
                None,
            )
            .await
            .unwrap();
        assert_eq!(seq, 1);
    }

    #[tokio::test]
    async fn replay_from_returns_events_at_or_after_seq() {
        let log = InMemoryEventLog::new();
        for _ in 0..3 {
            log.append(streams::TASKS, EventKind::TaskCreated, serde_json::json!({}), None)
                .await
                .unwrap();
        }
        let replayed = log.replay_from(streams::TASKS, 2);
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].sequence, 2);
    }

    #[tokio::test]
    async fn subscribers_receive_events_appended_after_subscribing() {
        let log = InMemoryEventLog::new();
        let mut rx = log.subscribe(streams::AGENTS);
        log.append(
            streams::AGENTS,
            EventKind::AgentRegistered,
            serde_json::json!({"name": "CoderBlueKoala"}),
            None,
        )
        .await
        .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::AgentRegistered);
    }
}
