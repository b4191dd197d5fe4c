//! Batch run-state, the `run_batch` entry points, and [`BatchHandle`].
//!
//! Every scheduled task causes exactly one decrement of its batch's
//! outstanding count: the worker that ran it decrements after recording the
//! outcome, or the caller that withdrew it decrements on its behalf. Which of
//! the two happens is decided by the task's own state transition, so the
//! pairing holds even when cancellation races the dispatcher.

use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::oneshot;

use crate::cancellation::CancellationPolicy;
use crate::collection::SharedCollection;
use crate::error::{Error, FetchError, Result};
use crate::fetcher::FetchOutcome;
use crate::notifier::Notifier;
use crate::task::CancellableTask;
use crate::types::{BatchId, BatchOutcome, DispatchClass, EventKind};

use super::completion::CompletionContext;
use super::queue::{QueuedTask, remove_entry};
use super::BatchCoordinator;

/// Batch-completion callback, receives the first recorded error
pub type OnComplete = Box<dyn FnOnce(Option<FetchError>) + Send + 'static>;

/// Per-batch options
#[derive(Clone, Default)]
pub struct BatchOptions {
    /// Dispatch class (None = the configured default)
    pub class: Option<DispatchClass>,
    /// Cancellation policy (None = the coordinator's default policy)
    pub policy: Option<Arc<dyn CancellationPolicy>>,
}

impl BatchOptions {
    /// Run the batch in `class`
    pub fn with_class(mut self, class: DispatchClass) -> Self {
        self.class = Some(class);
        self
    }

    /// Apply `policy` to the batch's tasks before they are queued
    pub fn with_policy(mut self, policy: impl CancellationPolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }
}

impl std::fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOptions")
            .field("class", &self.class)
            .field("policy", &self.policy.as_ref().map(|_| "custom"))
            .finish()
    }
}

/// Pieces handed over exactly once, when the batch finishes
struct Finish {
    on_complete: OnComplete,
    outcome_tx: oneshot::Sender<BatchOutcome>,
}

/// Run-state of one batch; never shared between batches
pub(crate) struct BatchState {
    id: BatchId,
    tasks: Vec<CancellableTask>,
    outstanding: AtomicUsize,
    completed: AtomicUsize,
    cancelled: AtomicUsize,
    items_added: AtomicUsize,
    first_error: OnceLock<FetchError>,
    active: AtomicBool,
    finisher: Mutex<Option<Finish>>,
    completion: CompletionContext,
    notifier: Notifier,
}

impl BatchState {
    fn new(
        id: BatchId,
        sources: Vec<String>,
        finish: Finish,
        completion: CompletionContext,
        notifier: Notifier,
    ) -> Self {
        let tasks: Vec<CancellableTask> = sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| CancellableTask::new(index, source))
            .collect();

        Self {
            id,
            outstanding: AtomicUsize::new(tasks.len()),
            tasks,
            completed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            items_added: AtomicUsize::new(0),
            first_error: OnceLock::new(),
            active: AtomicBool::new(true),
            finisher: Mutex::new(Some(finish)),
            completion,
            notifier,
        }
    }

    pub(crate) fn id(&self) -> BatchId {
        self.id
    }

    pub(crate) fn tasks(&self) -> &[CancellableTask] {
        &self.tasks
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Completion handler for a task that ran
    ///
    /// Records the error (first wins), appends the item, then decrements.
    pub(crate) fn task_completed(
        &self,
        outcome: FetchOutcome,
        collection: &SharedCollection,
    ) {
        if let Some(error) = outcome.error {
            tracing::warn!(
                batch_id = self.id.0,
                source = %error.target(),
                error_kind = error.kind(),
                error = %error,
                "fetch failed"
            );
            if let Err(later) = self.first_error.set(error) {
                tracing::debug!(
                    batch_id = self.id.0,
                    error = %later,
                    "batch already has an error recorded"
                );
            }
        }

        if let Some(item) = outcome.item {
            collection.append(item);
            self.items_added.fetch_add(1, Ordering::AcqRel);
        }

        self.completed.fetch_add(1, Ordering::AcqRel);
        self.leave();
    }

    /// Account for a task withdrawn before it started
    pub(crate) fn task_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::AcqRel);
        self.leave();
    }

    fn leave(&self) {
        match self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(1) => self.finish(),
            Ok(_) => {}
            Err(_) => {
                tracing::error!(batch_id = self.id.0, "outstanding count decremented below zero");
            }
        }
    }

    /// Runs once, when the outstanding count reaches zero
    fn finish(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        let outcome = BatchOutcome {
            batch_id: self.id,
            scheduled: self.tasks.len(),
            completed: self.completed.load(Ordering::Acquire),
            cancelled: self.cancelled.load(Ordering::Acquire),
            items_added: self.items_added.load(Ordering::Acquire),
            error: self.first_error.get().cloned(),
        };

        tracing::info!(
            batch_id = self.id.0,
            scheduled = outcome.scheduled,
            completed = outcome.completed,
            cancelled = outcome.cancelled,
            items_added = outcome.items_added,
            error = ?outcome.error,
            "batch complete"
        );

        self.notifier.publish(EventKind::ContentUpdated);

        let finish = self
            .finisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Finish {
            on_complete,
            outcome_tx,
        }) = finish
        else {
            return;
        };

        let batch_id = self.id;
        let dispatched = self.completion.dispatch(move || {
            let error = outcome.error.clone();
            let called = std::panic::catch_unwind(AssertUnwindSafe(move || on_complete(error)));
            // Nobody waiting on the handle is fine
            outcome_tx.send(outcome).ok();
            if let Err(panic) = called {
                // The completion context logs it and keeps running
                std::panic::resume_unwind(panic);
            }
        });
        if !dispatched {
            tracing::error!(
                batch_id = batch_id.0,
                "completion context stopped; callback dropped"
            );
        }
    }
}

/// Handle to a running batch
///
/// Dropping the handle does not affect the batch.
pub struct BatchHandle {
    batch: Arc<BatchState>,
    queue: Arc<tokio::sync::Mutex<BinaryHeap<QueuedTask>>>,
    outcome_rx: oneshot::Receiver<BatchOutcome>,
}

impl BatchHandle {
    /// Batch ID
    pub fn id(&self) -> BatchId {
        self.batch.id()
    }

    /// Number of scheduled tasks (one per source)
    pub fn scheduled(&self) -> usize {
        self.batch.tasks().len()
    }

    /// Tasks that have neither completed nor been withdrawn
    pub fn outstanding(&self) -> usize {
        self.batch.outstanding()
    }

    /// False once the completion callback has been dispatched
    pub fn is_active(&self) -> bool {
        self.batch.is_active()
    }

    /// The batch's tasks, in source order
    pub fn tasks(&self) -> &[CancellableTask] {
        self.batch.tasks()
    }

    /// Withdraw the task for the `index`-th source
    ///
    /// Returns `false` if the task already started (it will run to completion)
    /// or `index` is out of range.
    pub async fn cancel(&self, index: usize) -> bool {
        let Some(task) = self.batch.tasks().get(index) else {
            return false;
        };

        if !task.cancel() {
            return false;
        }

        self.batch.task_cancelled();
        remove_entry(&self.queue, self.batch.id(), index).await;
        true
    }

    /// Withdraw every task that has not started yet; returns how many were withdrawn
    pub async fn cancel_remaining(&self) -> usize {
        let mut withdrawn = 0;
        for index in 0..self.scheduled() {
            if self.cancel(index).await {
                withdrawn += 1;
            }
        }
        withdrawn
    }

    /// Wait for the batch to finish
    ///
    /// Resolves after the completion callback has run.
    pub async fn wait(self) -> Result<BatchOutcome> {
        let id = self.batch.id();
        self.outcome_rx.await.map_err(|_| Error::BatchDropped(id))
    }
}

impl std::fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchHandle")
            .field("id", &self.batch.id())
            .field("outstanding", &self.batch.outstanding())
            .finish()
    }
}

impl BatchCoordinator {
    /// Start a batch: one fetch per source, `on_complete` called exactly once
    ///
    /// Returns as soon as the tasks are queued. `on_complete` runs on the
    /// coordinator's completion context after every task has either finished
    /// or been withdrawn, and receives the first error any fetch reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use fetch_batch::{BatchCoordinator, Config, HttpFetcher};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let coordinator = BatchCoordinator::new(Config::default(), HttpFetcher::new())?;
    ///
    /// let handle = coordinator
    ///     .run_batch(["https://example.com/a.jpg", "https://example.com/b.jpg"], |error| {
    ///         match error {
    ///             Some(e) => eprintln!("batch finished with error: {}", e),
    ///             None => println!("batch finished"),
    ///         }
    ///     })
    ///     .await?;
    ///
    /// let outcome = handle.wait().await?;
    /// println!("{} items added", outcome.items_added);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_batch<I, S, F>(&self, sources: I, on_complete: F) -> Result<BatchHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Option<FetchError>) + Send + 'static,
    {
        self.run_batch_with(sources, BatchOptions::default(), on_complete)
            .await
    }

    /// [`run_batch`](Self::run_batch) with an explicit class and cancellation policy
    pub async fn run_batch_with<I, S, F>(
        &self,
        sources: I,
        options: BatchOptions,
        on_complete: F,
    ) -> Result<BatchHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Option<FetchError>) + Send + 'static,
    {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        let class = options.class.unwrap_or(self.config.default_class);
        let policy = options
            .policy
            .unwrap_or_else(|| Arc::clone(&self.default_policy));

        // Policies are user code: consult them before touching the queue so a
        // panicking policy leaves nothing queued.
        let withdrawn: Vec<bool> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| policy.should_cancel(index, source))
            .collect();

        let mut queue = if sources.is_empty() {
            None
        } else {
            let guard = self.queue_state.queue.lock().await;
            // Shutdown drains the queue under this lock; re-check to never queue behind it
            if !self.is_accepting() {
                return Err(Error::ShuttingDown);
            }
            Some(guard)
        };

        let id = BatchId(self.next_batch_id.fetch_add(1, Ordering::Relaxed));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let batch = Arc::new(BatchState::new(
            id,
            sources,
            Finish {
                on_complete: Box::new(on_complete),
                outcome_tx,
            },
            self.completion.clone(),
            self.notifier.clone(),
        ));

        tracing::info!(
            batch_id = id.0,
            sources = batch.tasks().len(),
            class = ?class,
            "batch started"
        );

        match queue.as_mut() {
            None => batch.finish(),
            Some(queue) => {
                let mut cancelled = 0;
                for (task, withdraw) in batch.tasks().iter().zip(withdrawn) {
                    if withdraw && task.cancel() {
                        cancelled += 1;
                        batch.task_cancelled();
                        continue;
                    }
                    queue.push(QueuedTask {
                        class,
                        seq: self.queue_state.next_seq.fetch_add(1, Ordering::Relaxed),
                        task: task.clone(),
                        batch: Arc::clone(&batch),
                    });
                    tracing::debug!(
                        batch_id = id.0,
                        index = task.index(),
                        source = %task.source(),
                        "task queued"
                    );
                }
                if cancelled > 0 {
                    tracing::info!(
                        batch_id = id.0,
                        cancelled,
                        "tasks withdrawn before start"
                    );
                }
            }
        }
        drop(queue);

        self.queue_state.queue_signal.notify_one();

        Ok(BatchHandle {
            batch,
            queue: Arc::clone(&self.queue_state.queue),
            outcome_rx,
        })
    }

    /// Run a batch and wait for it to finish ("wait for group" mode)
    ///
    /// Must not be awaited on a thread that also has to drive UI work.
    pub async fn run_batch_and_wait<I, S>(&self, sources: I) -> Result<BatchOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_batch(sources, |_| {}).await?.wait().await
    }
}
