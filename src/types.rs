//! Core types: items, identifiers, dispatch classes, and notification kinds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::FetchError;

/// Unique identifier for an item
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    /// Allocate the next process-unique item ID
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one batch, unique per coordinator
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Item status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Content not available yet
    Pending,
    /// Content fetched successfully
    Ready,
    /// Fetch finished without usable content
    Failed,
}

/// One unit of content, immutable once constructed
///
/// Items are created when a fetch completes and are shared by `Arc` once they
/// have been appended to a [`SharedCollection`](crate::SharedCollection).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    source: String,
    payload: Option<Vec<u8>>,
    status: ItemStatus,
    fetched_at: DateTime<Utc>,
}

impl Item {
    /// Create an item with an explicit status
    pub fn new(source: impl Into<String>, payload: Option<Vec<u8>>, status: ItemStatus) -> Self {
        Self {
            id: ItemId::next(),
            source: source.into(),
            payload,
            status,
            fetched_at: Utc::now(),
        }
    }

    /// A successfully fetched item
    pub fn ready(source: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::new(source, Some(payload), ItemStatus::Ready)
    }

    /// An item whose content could not be fetched
    pub fn failed(source: impl Into<String>) -> Self {
        Self::new(source, None, ItemStatus::Failed)
    }

    /// Item ID
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Source identifier the item was fetched from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fetched content, if any
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Item status
    pub fn status(&self) -> ItemStatus {
        self.status
    }

    /// When the item was constructed
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Dispatch class of a batch
///
/// Tasks of a `UserInitiated` batch are dequeued before `Utility` tasks;
/// within a class tasks run in the order they were queued.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DispatchClass {
    /// Background work the user is not waiting on (default)
    #[default]
    Utility,
    /// Work the user started and is waiting for
    UserInitiated,
}

/// Notification kinds published by the [`Notifier`](crate::Notifier)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// An item was appended to the collection
    ContentAdded,
    /// A batch finished and the collection content is up to date
    ContentUpdated,
}

impl EventKind {
    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ContentAdded => "content-added",
            EventKind::ContentUpdated => "content-updated",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final accounting of one batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Batch ID
    pub batch_id: BatchId,
    /// Number of tasks scheduled (one per source)
    pub scheduled: usize,
    /// Tasks that ran to completion, successfully or not
    pub completed: usize,
    /// Tasks withdrawn before they started
    pub cancelled: usize,
    /// Items appended to the collection by this batch
    pub items_added: usize,
    /// First error recorded by the batch
    pub error: Option<FetchError>,
}

impl BatchOutcome {
    /// True when no task reported an error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a `Result`, failing with the batch's first error
    pub fn into_result(self) -> crate::error::Result<Self> {
        match self.error.clone() {
            Some(error) => Err(error.into()),
            None => Ok(self),
        }
    }
}
