//! Per-agent Inbox (C4): FIFO-by-priority queue plus a single in-progress
//! slot.

use std::collections::VecDeque;

use crate::error::{CoordError, ServerResult};
use crate::tasks::{Priority, TaskId};

/// A pending entry: the task id plus enough ordering metadata to sort by
/// priority bucket then arrival order.
#[derive(Debug, Clone)]
struct PendingEntry {
    task_id: TaskId,
    priority: Priority,
    enqueued_at: u64,
}

/// Per-agent FIFO-by-priority task queue with one in-progress slot.
#[derive(Debug, Default)]
pub struct Inbox {
    pending: VecDeque<PendingEntry>,
    current: Option<TaskId>,
    completed_count: u64,
    failed_count: u64,
    next_seq: u64,
    soft_cap: usize,
}

/// Default soft cap on pending entries per inbox (see §5 Backpressure).
pub const DEFAULT_SOFT_CAP: usize = 1024;

impl Inbox {
    /// Create an empty inbox with the default soft cap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            soft_cap: DEFAULT_SOFT_CAP,
            ..Self::default()
        }
    }

    /// Whether this inbox is at or above its soft cap.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.soft_cap
    }

    /// Append a task id to the appropriate priority bucket. Returns an
    /// error if the inbox is at capacity.
    pub fn enqueue(&mut self, task_id: TaskId, priority: Priority) -> ServerResult<()> {
        if self.is_full() {
            return Err(CoordError::internal("inbox is at capacity"));
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = PendingEntry {
            task_id,
            priority,
            enqueued_at: seq,
        };

        // Insertion keeps the deque sorted by (priority desc, enqueued_at
        // asc): find the first entry with a lower-or-equal priority and
        // insert before it, preserving FIFO within a bucket.
        let position = self
            .pending
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.pending.len());
        self.pending.insert(position, entry);

        Ok(())
    }

    /// Promote the head of the pending queue into `current`. Fails if a
    /// task is already in progress.
    pub fn take_next(&mut self) -> ServerResult<Option<TaskId>> {
        if self.current.is_some() {
            return Err(CoordError::InvalidTransition(
                "agent already has a task in progress".to_string(),
            ));
        }

        let Some(entry) = self.pending.pop_front() else {
            return Ok(None);
        };

        self.current = Some(entry.task_id.clone());
        Ok(Some(entry.task_id))
    }

    /// Mark the current task completed, clearing the slot.
    pub fn complete(&mut self) -> ServerResult<TaskId> {
        let task_id = self
            .current
            .take()
            .ok_or_else(|| CoordError::InvalidTransition("no current task to complete".to_string()))?;
        self.completed_count += 1;
        Ok(task_id)
    }

    /// Mark the current task failed, clearing the slot.
    pub fn fail(&mut self) -> ServerResult<TaskId> {
        let task_id = self
            .current
            .take()
            .ok_or_else(|| CoordError::InvalidTransition("no current task to fail".to_string()))?;
        self.failed_count += 1;
        Ok(task_id)
    }

    /// The task currently occupying the in-progress slot, if any.
    #[must_use]
    pub fn current(&self) -> Option<&TaskId> {
        self.current.as_ref()
    }

    /// All pending task ids in dispatch order.
    #[must_use]
    pub fn list_pending(&self) -> Vec<TaskId> {
        self.pending.iter().map(|e| e.task_id.clone()).collect()
    }

    /// Number of pending entries.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Completed/failed counters, `(completed, failed)`.
    #[must_use]
    pub fn counters(&self) -> (u64, u64) {
        (self.completed_count, self.failed_count)
    }

    /// Remove a specific pending task id (used when a blocked task is
    /// cancelled or reassigned out of band).
    pub fn remove_pending(&mut self, task_id: &TaskId) {
        self.pending.retain(|e| &e.task_id != task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(s: &str) -> TaskId {
        TaskId(s.to_string())
    }

    #[test]
    fn urgent_arriving_after_normal_is_taken_next() {
        let mut inbox = Inbox::new();
        inbox.enqueue(tid("t-normal"), Priority::Normal).unwrap();
        inbox.enqueue(tid("t-urgent"), Priority::Urgent).unwrap();
        assert_eq!(inbox.take_next().unwrap(), Some(tid("t-urgent")));
    }

    #[test]
    fn fifo_within_same_priority_bucket() {
        let mut inbox = Inbox::new();
        inbox.enqueue(tid("t1"), Priority::Normal).unwrap();
        inbox.enqueue(tid("t2"), Priority::Normal).unwrap();
        assert_eq!(inbox.take_next().unwrap(), Some(tid("t1")));
    }

    #[test]
    fn take_next_fails_with_task_in_progress() {
        let mut inbox = Inbox::new();
        inbox.enqueue(tid("t1"), Priority::Normal).unwrap();
        inbox.take_next().unwrap();
        assert!(inbox.take_next().is_err());
    }

    #[test]
    fn complete_clears_current_and_increments_counter() {
        let mut inbox = Inbox::new();
        inbox.enqueue(tid("t1"), Priority::Normal).unwrap();
        inbox.take_next().unwrap();
        inbox.complete().unwrap();
        assert!(inbox.current().is_none());
        assert_eq!(inbox.counters().0, 1);
    }

    #[test]
    fn complete_without_current_is_invalid_transition() {
        let mut inbox = Inbox::new();
        assert!(inbox.complete().is_err());
    }
}
