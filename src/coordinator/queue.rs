//! Priority work queue of pending tasks.

use std::sync::Arc;

use crate::task::CancellableTask;
use crate::types::{BatchId, DispatchClass};

use super::BatchCoordinator;
use super::batch::BatchState;

/// Internal struct representing a pending task in the priority queue
pub(crate) struct QueuedTask {
    pub(crate) class: DispatchClass,
    pub(crate) seq: u64, // enqueue order for FIFO tie-breaking
    pub(crate) task: CancellableTask,
    pub(crate) batch: Arc<BatchState>,
}

impl QueuedTask {
    pub(crate) fn batch_id(&self) -> BatchId {
        self.batch.id()
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

// Implement Ord for BinaryHeap (max-heap by default)
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // First compare by class (UserInitiated wins)
        match self.class.cmp(&other.class) {
            std::cmp::Ordering::Equal => {
                // Reversed: earlier (lower seq) entries must come out first
                other.seq.cmp(&self.seq)
            }
            ordering => ordering,
        }
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl BatchCoordinator {
    /// Withdraw every task still waiting in the queue
    ///
    /// Each withdrawn task is accounted to its batch as a cancellation, so open
    /// batches still complete. Returns the number of tasks withdrawn.
    pub(crate) async fn drain_queue(&self) -> usize {
        let entries: Vec<QueuedTask> = {
            let mut queue = self.queue_state.queue.lock().await;
            queue.drain().collect()
        };

        let mut withdrawn = 0;
        for entry in entries {
            if entry.task.cancel() {
                entry.batch.task_cancelled();
                withdrawn += 1;
            }
        }

        withdrawn
    }

    /// Number of entries waiting in the queue (including withdrawn ones not yet skipped)
    pub async fn queued_len(&self) -> usize {
        self.queue_state.queue.lock().await.len()
    }
}

/// Remove one task's entry from the queue without starting it
///
/// Returns true if the entry was found and removed.
pub(crate) async fn remove_entry(
    queue: &tokio::sync::Mutex<std::collections::BinaryHeap<QueuedTask>>,
    batch_id: BatchId,
    index: usize,
) -> bool {
    let mut queue = queue.lock().await;
    let original_len = queue.len();
    queue.retain(|entry| !(entry.batch_id() == batch_id && entry.task.index() == index));
    queue.len() < original_len
}
