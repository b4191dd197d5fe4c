//! Error types for fetch-batch
//!
//! Two layers of errors live here:
//! - [`Error`] is returned by coordinator-level operations (configuration,
//!   starting a batch, shutdown).
//! - [`FetchError`] describes why a single fetch did not produce an item. It is
//!   a plain value: it is recorded first-error-wins by a batch and handed to the
//!   batch-completion callback, never propagated across threads any other way.

use std::time::Duration;
use thiserror::Error;

use crate::types::BatchId;

/// Result type alias for fetch-batch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fetch-batch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_fetches")
        key: Option<String>,
    },

    /// A fetch failed
    ///
    /// Surfaced through [`BatchOutcome::into_result`](crate::BatchOutcome::into_result).
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Shutdown in progress - not accepting new batches
    #[error("shutdown in progress: not accepting new batches")]
    ShuttingDown,

    /// The coordinator went away before the batch could report its outcome
    #[error("batch {0} was dropped before it completed")]
    BatchDropped(BatchId),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Fetch(e) => e.kind(),
            Error::ShuttingDown => "shutting_down",
            Error::BatchDropped(_) => "batch_dropped",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }
}

/// Why a single fetch did not produce an item
///
/// `target` is the source identifier the fetch was started with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The fetcher ran but could not produce an item
    #[error("fetch failed for {target}: {reason}")]
    FetchFailed {
        /// Source identifier
        target: String,
        /// Why the fetch failed
        reason: String,
    },

    /// Transport-level failure (connection refused, non-success status, ...)
    #[error("network error fetching {target}: {message}")]
    Network {
        /// Source identifier
        target: String,
        /// Transport error message
        message: String,
    },

    /// The source identifier could not be interpreted by the fetcher
    #[error("invalid source {target}: {reason}")]
    InvalidSource {
        /// Source identifier
        target: String,
        /// Why it was rejected
        reason: String,
    },

    /// The fetch did not complete within the configured timeout
    #[error("fetch for {target} timed out after {after:?}")]
    TimedOut {
        /// Source identifier
        target: String,
        /// The timeout that elapsed
        after: Duration,
    },

    /// A callback-style fetcher dropped its completion handle without calling it
    #[error("fetch for {target} was abandoned without completing")]
    Abandoned {
        /// Source identifier
        target: String,
    },
}

impl FetchError {
    /// Shorthand for [`FetchError::FetchFailed`]
    pub fn failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        FetchError::FetchFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`FetchError::Network`]
    pub fn network(target: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Network {
            target: target.into(),
            message: message.into(),
        }
    }

    /// The source identifier this error refers to
    pub fn target(&self) -> &str {
        match self {
            FetchError::FetchFailed { target, .. }
            | FetchError::Network { target, .. }
            | FetchError::InvalidSource { target, .. }
            | FetchError::TimedOut { target, .. }
            | FetchError::Abandoned { target } => target,
        }
    }

    /// Machine-readable error kind, used as a structured logging field
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::FetchFailed { .. } => "fetch_failed",
            FetchError::Network { .. } => "network_error",
            FetchError::InvalidSource { .. } => "invalid_source",
            FetchError::TimedOut { .. } => "timed_out",
            FetchError::Abandoned { .. } => "abandoned",
        }
    }
}
