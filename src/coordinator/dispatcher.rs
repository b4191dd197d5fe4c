//! Queue processor: pops pending tasks in priority order and runs their fetches.

use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;
use crate::fetcher::{AsyncFetcher, FetchOutcome};

use super::BatchCoordinator;

impl BatchCoordinator {
    /// Start the dispatcher task
    ///
    /// The dispatcher continuously:
    /// 1. Acquires a permit from the concurrency limiter (respects max_concurrent_fetches)
    /// 2. Pops the highest-priority entry from the queue, or waits for new work
    /// 3. Claims the task (`Pending -> Running`); entries that were withdrawn meanwhile are skipped
    /// 4. Spawns a worker that runs the fetch and reports to the batch
    ///
    /// Taking the permit before popping keeps waiting tasks in the queue, where
    /// they can still be withdrawn.
    pub(crate) fn start_dispatcher(&self) {
        let queue = Arc::clone(&self.queue_state.queue);
        let queue_signal = Arc::clone(&self.queue_state.queue_signal);
        let concurrent_limit = Arc::clone(&self.queue_state.concurrent_limit);
        let shutdown = self.queue_state.shutdown.clone();
        let workers = self.queue_state.workers.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let collection = self.collection.clone();
        let fetch_timeout = self.config.fetch_timeout;

        self.queue_state.workers.spawn(async move {
            loop {
                let permit = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    permit = Arc::clone(&concurrent_limit).acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => break, // semaphore closed
                    },
                };

                let next = {
                    let mut queue_guard = queue.lock().await;
                    queue_guard.pop()
                };

                let Some(entry) = next else {
                    // Queue is empty, wait for new work
                    drop(permit);
                    let stop = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => true,
                        _ = queue_signal.notified() => false,
                    };
                    if stop {
                        break;
                    }
                    continue;
                };

                if !entry.task.begin() {
                    // Withdrawn after it was queued; the canceller already accounted for it
                    tracing::debug!(
                        batch_id = entry.batch_id().0,
                        index = entry.task.index(),
                        "skipping withdrawn task"
                    );
                    continue;
                }

                let fetcher = Arc::clone(&fetcher);
                let collection = collection.clone();
                workers.spawn(async move {
                    let _permit = permit;
                    let source = entry.task.source().to_string();
                    tracing::debug!(
                        batch_id = entry.batch_id().0,
                        index = entry.task.index(),
                        source = %source,
                        class = ?entry.class,
                        "task started"
                    );

                    let outcome = run_fetch(fetcher, source, fetch_timeout).await;
                    entry.task.finish();
                    entry.batch.task_completed(outcome, &collection);
                });
            }

            tracing::debug!("dispatcher stopped");
        });
    }
}

/// Run one fetch on its own task, converting panics and timeouts into errors
async fn run_fetch(
    fetcher: Arc<dyn AsyncFetcher>,
    source: String,
    timeout: Option<Duration>,
) -> FetchOutcome {
    let target = source.clone();
    let mut handle = tokio::spawn(async move { fetcher.fetch(&source).await });

    let joined = match timeout {
        Some(after) => match tokio::time::timeout(after, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                tracing::warn!(source = %target, timeout = ?after, "fetch timed out");
                return FetchOutcome::failed(FetchError::TimedOut { target, after });
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(source = %target, error = %e, "fetch task panicked");
            FetchOutcome::failed(FetchError::failed(target, format!("fetch task failed: {}", e)))
        }
    }
}
