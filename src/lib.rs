//! # fetch-batch
//!
//! Concurrent batch acquisition of remote content into a shared collection.
//!
//! ## Design Philosophy
//!
//! fetch-batch is designed to be:
//! - **Exactly-once** - Every batch fires its completion callback once, after
//!   every task has finished or been withdrawn
//! - **Cancellation-aware** - Tasks withdrawn before they start never run and
//!   are counted as done
//! - **Pluggable** - Fetching sits behind [`AsyncFetcher`]; HTTP and
//!   callback-style fetchers are included
//! - **Event-driven** - Consumers subscribe to content notifications, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetch_batch::{BatchCoordinator, Config, EventKind, HttpFetcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = BatchCoordinator::new(Config::default(), HttpFetcher::new())?;
//!
//!     // Redraw whenever the collection changes
//!     let _subscription = coordinator.subscribe(EventKind::ContentAdded, || {
//!         println!("collection changed");
//!     });
//!
//!     let handle = coordinator
//!         .run_batch(
//!             [
//!                 "https://example.com/photos/1.jpg",
//!                 "https://example.com/photos/2.jpg",
//!             ],
//!             |error| match error {
//!                 Some(e) => eprintln!("batch finished with error: {}", e),
//!                 None => println!("batch finished"),
//!             },
//!         )
//!         .await?;
//!
//!     let outcome = handle.wait().await?;
//!     println!("{} items in collection", coordinator.collection().len());
//!     outcome.into_result()?;
//!
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Pre-start cancellation policies
pub mod cancellation;
/// Shared item collection
pub mod collection;
/// Configuration types
pub mod config;
/// Batch coordinator (decomposed into focused submodules)
pub mod coordinator;
/// Error types
pub mod error;
/// Fetcher abstraction and implementations
pub mod fetcher;
/// Content notifications
pub mod notifier;
/// Cancellable tasks
pub mod task;
/// Core types
pub mod types;

// Re-export commonly used types
pub use cancellation::{CancelIndices, CancellationPolicy, NeverCancel, RandomCancel};
pub use collection::SharedCollection;
pub use config::{CancellationConfig, Config};
pub use coordinator::{BatchCoordinator, BatchHandle, BatchOptions, CompletionContext, OnComplete};
pub use error::{Error, FetchError, Result};
pub use fetcher::{
    AsyncFetcher, CallbackFetch, CallbackFetcher, Completion, FetchOutcome, HttpFetcher,
};
pub use notifier::{Notifier, Subscription};
pub use task::{CancellableTask, TaskState};
pub use types::{BatchId, BatchOutcome, DispatchClass, EventKind, Item, ItemId, ItemStatus};

/// Helper function to run the coordinator with graceful signal handling.
///
/// Waits for a termination signal and then calls the coordinator's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use fetch_batch::{BatchCoordinator, Config, HttpFetcher, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = BatchCoordinator::new(Config::default(), HttpFetcher::new())?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(coordinator).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(coordinator: BatchCoordinator) {
    wait_for_signal().await;
    coordinator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(
                error = %e,
                "Could not register SIGTERM handler, waiting for SIGINT only"
            );
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(
                error = %e,
                "Could not register SIGINT handler, waiting for SIGTERM only"
            );
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(
                error = %e,
                "Could not register any signal handlers, using ctrl_c fallback"
            );
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
