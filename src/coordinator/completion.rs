//! Serial completion context
//!
//! Batch-completion callbacks do not run on whichever worker finished last;
//! they are queued onto one dedicated task and executed one at a time, in the
//! order they were dispatched.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

tokio::task_local! {
    static CURRENT_CONTEXT: u64;
}

/// Handle to a serial execution context (cloneable - clones share the context)
///
/// The context runs until every handle to it has been dropped.
#[derive(Clone, Debug)]
pub struct CompletionContext {
    id: u64,
    tx: mpsc::UnboundedSender<Job>,
}

impl CompletionContext {
    /// Start a new context on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = CURRENT_CONTEXT.sync_scope(id, || {
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(job))
                });
                if result.is_err() {
                    tracing::error!(context_id = id, "completion callback panicked");
                }
            }
            tracing::debug!(context_id = id, "completion context stopped");
        });

        Self { id, tx }
    }

    /// Queue `job` to run on the context
    ///
    /// Returns `false` if the context has stopped and the job was dropped.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(job)).is_ok()
    }

    /// True when called from a job running on this context
    pub fn is_current(&self) -> bool {
        CURRENT_CONTEXT
            .try_with(|current| *current == self.id)
            .unwrap_or(false)
    }
}
