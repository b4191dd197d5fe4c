//! Shutdown coordination.

use std::sync::atomic::Ordering;

use super::BatchCoordinator;

impl BatchCoordinator {
    /// Gracefully shut down the coordinator
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new batches (`run_batch` returns `Error::ShuttingDown`)
    /// 2. Withdraws every task still waiting in the queue; each counts as a
    ///    cancellation, so open batches still fire their completion callbacks
    /// 3. Stops the dispatcher
    /// 4. Waits for running fetches, up to `shutdown_grace`
    ///
    /// Running fetches are never interrupted. Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new batches
        if !self.queue_state.accepting_new.swap(false, Ordering::SeqCst) {
            tracing::debug!("Shutdown already in progress");
        }

        // 2. Withdraw pending work
        let withdrawn = self.drain_queue().await;
        tracing::info!(withdrawn, "Withdrew pending tasks");

        // 3. Stop the dispatcher
        self.queue_state.shutdown.cancel();
        self.queue_state.workers.close();

        // 4. Wait for running fetches with timeout
        let grace = self.config.shutdown_grace;
        match tokio::time::timeout(grace, self.queue_state.workers.wait()).await {
            Ok(()) => tracing::info!("All running fetches completed"),
            Err(_) => tracing::warn!(
                grace = ?grace,
                running = self.queue_state.workers.len(),
                "Timeout waiting for running fetches, proceeding with shutdown"
            ),
        }

        tracing::info!("Graceful shutdown complete");
    }

    /// False once shutdown has begun
    pub fn is_accepting(&self) -> bool {
        self.queue_state.accepting_new.load(Ordering::SeqCst)
    }
}
