//! Deferred work that can be withdrawn until it starts
//!
//! A [`CancellableTask`] moves through `Pending -> Running -> Done`, or
//! `Pending -> Cancelled`. Both exits from `Pending` are decided by a single
//! compare-and-swap, so exactly one of "cancel" and "begin" can win. Running
//! work is never interrupted.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const PENDING: u8 = 0;
const CANCELLED: u8 = 1;
const RUNNING: u8 = 2;
const DONE: u8 = 3;

/// Lifecycle state of a [`CancellableTask`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Queued, not started; may still be cancelled
    Pending,
    /// Withdrawn before it started; terminal
    Cancelled,
    /// Started; can no longer be cancelled
    Running,
    /// Finished; terminal
    Done,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            PENDING => TaskState::Pending,
            CANCELLED => TaskState::Cancelled,
            RUNNING => TaskState::Running,
            _ => TaskState::Done,
        }
    }
}

struct TaskInner {
    index: usize,
    source: String,
    state: AtomicU8,
}

/// One scheduled fetch of a batch (cloneable - clones share state)
#[derive(Clone)]
pub struct CancellableTask {
    inner: Arc<TaskInner>,
}

impl CancellableTask {
    /// Create a pending task for the `index`-th source of a batch
    pub fn new(index: usize, source: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                index,
                source: source.into(),
                state: AtomicU8::new(PENDING),
            }),
        }
    }

    /// Position of the task's source in its batch
    pub fn index(&self) -> usize {
        self.inner.index
    }

    /// Source identifier the task will fetch
    pub fn source(&self) -> &str {
        &self.inner.source
    }

    /// Current state
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Withdraw the task
    ///
    /// Returns `true` if the task was still pending and will now never run.
    /// `false` means it already started (or finished, or was cancelled
    /// before) and will run to completion.
    pub fn cancel(&self) -> bool {
        let withdrawn = self
            .inner
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if withdrawn {
            tracing::debug!(
                index = self.inner.index,
                source = %self.inner.source,
                "task cancelled"
            );
        }
        withdrawn
    }

    /// Claim the task for execution (`Pending -> Running`)
    ///
    /// Returns `false` if the task was cancelled or already claimed.
    pub fn begin(&self) -> bool {
        self.inner
            .state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mark a running task as finished (`Running -> Done`)
    pub fn finish(&self) {
        if self
            .inner
            .state
            .compare_exchange(RUNNING, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(
                index = self.inner.index,
                state = ?self.state(),
                "finish called on a task that was not running"
            );
        }
    }

    /// Run `work` unless the task has been cancelled
    ///
    /// `work` is not polled at all when the task cannot be claimed, in which
    /// case `None` is returned.
    pub async fn run<Fut>(&self, work: Fut) -> Option<Fut::Output>
    where
        Fut: Future,
    {
        if !self.begin() {
            return None;
        }
        let output = work.await;
        self.finish();
        Some(output)
    }
}

impl std::fmt::Debug for CancellableTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableTask")
            .field("index", &self.inner.index)
            .field("source", &self.inner.source)
            .field("state", &self.state())
            .finish()
    }
}
