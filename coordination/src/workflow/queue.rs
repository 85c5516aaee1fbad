//! Ready queue for dispatchable tasks
//!
//! Ordered by priority (critical first), then strictly FIFO by enqueue
//! sequence. Only tasks whose prerequisites have all completed are ever
//! pushed here.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use super::types::{Priority, TaskId, WorkflowId};

/// A queued task reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub priority: Priority,
    /// Enqueue order; lower is older
    pub seq: u64,
    pub workflow_id: WorkflowId,
    pub task_id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority wins, then older seq.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded priority queue shared by the scheduler and its loop.
///
/// Capacity is enforced when work is admitted (`try_push_batch`). Internal
/// re-enqueues of already-admitted tasks (dependents, retries) always
/// succeed.
pub struct ReadyQueue {
    heap: Mutex<BinaryHeap<QueueEntry>>,
    next_seq: AtomicU64,
    notify: Notify,
    capacity: usize,
}

impl ReadyQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Build an entry stamped with the next enqueue sequence
    pub fn entry(&self, priority: Priority, workflow_id: &str, task_id: &str) -> QueueEntry {
        QueueEntry {
            priority,
            seq: self.next_seq.fetch_add(1, AtomicOrdering::SeqCst),
            workflow_id: workflow_id.to_string(),
            task_id: task_id.to_string(),
        }
    }

    /// Push an entry, keeping its sequence number
    pub fn push(&self, entry: QueueEntry) {
        {
            let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
            heap.push(entry);
        }
        self.notify.notify_one();
    }

    /// Push all entries or none; `Err(capacity)` when they do not fit
    pub fn try_push_batch(&self, entries: Vec<QueueEntry>) -> Result<(), usize> {
        let count = entries.len();
        {
            let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
            if heap.len() + count > self.capacity {
                return Err(self.capacity);
            }
            heap.extend(entries);
        }
        for _ in 0..count {
            self.notify.notify_one();
        }
        Ok(())
    }

    pub fn pop(&self) -> Option<QueueEntry> {
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        heap.pop()
    }

    /// Pop the next entry, waiting at most `poll` for one to arrive.
    ///
    /// Cancel-safe: dropping the future never loses an entry.
    pub async fn wait_pop(&self, poll: Duration) -> Option<QueueEntry> {
        if let Some(entry) = self.pop() {
            return Some(entry);
        }
        let _ = tokio::time::timeout(poll, self.notify.notified()).await;
        self.pop()
    }

    /// Remove and return every entry belonging to a workflow, oldest first
    pub fn drain_workflow(&self, workflow_id: &str) -> Vec<QueueEntry> {
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        let (mut drained, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *heap)
            .into_vec()
            .into_iter()
            .partition(|e| e.workflow_id == workflow_id);
        *heap = BinaryHeap::from(kept);
        drained.sort_by_key(|e| e.seq);
        drained
    }

    pub fn len(&self) -> usize {
        self.heap.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
