//! Batch coordinator split into focused submodules.
//!
//! The `BatchCoordinator` struct and its methods are organized by concern:
//! - [`batch`] - Batch run-state, `run_batch` entry points, batch handles
//! - [`queue`] - Priority work queue of pending tasks
//! - [`dispatcher`] - Queue processing and fetch execution
//! - [`completion`] - Serial completion context for batch callbacks
//! - [`lifecycle`] - Shutdown coordination

mod batch;
mod completion;
mod dispatcher;
mod lifecycle;
mod queue;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use batch::{BatchHandle, BatchOptions, OnComplete};
pub use completion::CompletionContext;

use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use crate::cancellation::{CancellationPolicy, NeverCancel, RandomCancel};
use crate::collection::SharedCollection;
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::AsyncFetcher;
use crate::notifier::{Notifier, Subscription};
use crate::types::EventKind;

use queue::QueuedTask;

/// Work queue and execution state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Priority queue of pending tasks (protected by Mutex)
    pub(crate) queue: Arc<tokio::sync::Mutex<BinaryHeap<QueuedTask>>>,
    /// Wakes the dispatcher when tasks are queued
    pub(crate) queue_signal: Arc<tokio::sync::Notify>,
    /// Semaphore to limit concurrent fetches (respects max_concurrent_fetches config)
    pub(crate) concurrent_limit: Arc<tokio::sync::Semaphore>,
    /// Enqueue order counter for FIFO tie-breaking within a dispatch class
    pub(crate) next_seq: Arc<AtomicU64>,
    /// Dispatcher and running workers
    pub(crate) workers: tokio_util::task::TaskTracker,
    /// Stops the dispatcher
    pub(crate) shutdown: tokio_util::sync::CancellationToken,
    /// Flag to indicate whether new batches are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

/// Concurrent batch-acquisition manager (cloneable - all fields are Arc-wrapped)
///
/// Build one with [`BatchCoordinator::new`] at the top of the application and
/// hand clones to whoever needs it. Dropping every clone does not stop the
/// background dispatcher; call [`shutdown`](Self::shutdown) for that.
#[derive(Clone)]
pub struct BatchCoordinator {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Fetcher every task calls
    pub(crate) fetcher: Arc<dyn AsyncFetcher>,
    /// Items produced by all batches
    pub(crate) collection: SharedCollection,
    /// Content notifications
    pub(crate) notifier: Notifier,
    /// Where batch-completion callbacks run
    pub(crate) completion: CompletionContext,
    /// Work queue and execution state
    pub(crate) queue_state: QueueState,
    /// Policy for batches that do not bring their own
    pub(crate) default_policy: Arc<dyn CancellationPolicy>,
    /// Next batch ID
    pub(crate) next_batch_id: Arc<AtomicU64>,
}

impl BatchCoordinator {
    /// Create a coordinator with its own completion context
    ///
    /// Must be called from within a tokio runtime: the dispatcher and the
    /// completion context are spawned immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration is invalid.
    pub fn new(config: Config, fetcher: impl AsyncFetcher + 'static) -> Result<Self> {
        Self::with_context(config, Arc::new(fetcher), CompletionContext::spawn())
    }

    /// Create a coordinator delivering completion callbacks on `completion`
    ///
    /// Use this to share one serial context (for example the one driving UI
    /// updates) between several coordinators.
    pub fn with_context(
        config: Config,
        fetcher: Arc<dyn AsyncFetcher>,
        completion: CompletionContext,
    ) -> Result<Self> {
        config.validate()?;

        let notifier = Notifier::new(config.event_buffer);
        let collection = SharedCollection::new(notifier.clone());

        let default_policy: Arc<dyn CancellationPolicy> = if config.cancellation.enabled {
            Arc::new(RandomCancel::from_config(&config.cancellation))
        } else {
            Arc::new(NeverCancel)
        };

        tracing::info!(
            max_concurrent_fetches = config.max_concurrent_fetches,
            fetch_timeout = ?config.fetch_timeout,
            random_cancellation = config.cancellation.enabled,
            "Batch coordinator initialized"
        );

        let queue_state = QueueState {
            queue: Arc::new(tokio::sync::Mutex::new(BinaryHeap::new())),
            queue_signal: Arc::new(tokio::sync::Notify::new()),
            concurrent_limit: Arc::new(tokio::sync::Semaphore::new(
                config.max_concurrent_fetches,
            )),
            next_seq: Arc::new(AtomicU64::new(0)),
            workers: tokio_util::task::TaskTracker::new(),
            shutdown: tokio_util::sync::CancellationToken::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        let coordinator = Self {
            config: Arc::new(config),
            fetcher,
            collection,
            notifier,
            completion,
            queue_state,
            default_policy,
            next_batch_id: Arc::new(AtomicU64::new(1)),
        };

        coordinator.start_dispatcher();
        Ok(coordinator)
    }

    /// The shared item collection
    pub fn collection(&self) -> &SharedCollection {
        &self.collection
    }

    /// The content notification channel
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run `handler` for every `kind` notification
    ///
    /// Shorthand for `coordinator.notifier().subscribe(kind, handler)`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier.subscribe(kind, handler)
    }

    /// The context batch-completion callbacks run on
    pub fn completion_context(&self) -> &CompletionContext {
        &self.completion
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("config", &self.config)
            .field("accepting_new", &self.is_accepting())
            .finish_non_exhaustive()
    }
}
