//! Publish/subscribe channel for content notifications
//!
//! The notifier wraps a tokio broadcast channel. Publishing never waits on
//! subscribers: if nobody listens the event is dropped, and a subscriber that
//! falls more than `event_buffer` events behind skips ahead. Events carry no
//! payload, so observers re-query [`SharedCollection::snapshot`](crate::SharedCollection::snapshot)
//! when they receive one.

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::types::EventKind;

/// Content notification channel (cloneable, all clones share one channel)
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: broadcast::Sender<EventKind>,
}

impl Notifier {
    /// Create a notifier buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Announce an event to all current subscribers
    ///
    /// Returns immediately; handlers run on their own tasks.
    pub fn publish(&self, kind: EventKind) {
        // send() only fails when there are no receivers, which is fine
        self.tx.send(kind).ok();
    }

    /// Raw receiver for every event kind
    pub fn receiver(&self) -> broadcast::Receiver<EventKind> {
        self.tx.subscribe()
    }

    /// Stream of notifications of one kind
    ///
    /// A lagging stream yields a single item for the events it skipped.
    pub fn stream(&self, kind: EventKind) -> impl Stream<Item = EventKind> + Send + use<> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |received| async move {
            match received {
                Ok(event) if event == kind => Some(event),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(event = %kind, skipped, "notification stream lagged");
                    Some(kind)
                }
            }
        })
    }

    /// Run `handler` for every event of `kind`
    ///
    /// The handler runs on a dedicated tokio task, so this must be called from
    /// within a runtime. The subscription lives until [`Subscription::unsubscribe`]
    /// is called or the notifier and all its clones are dropped.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut rx = self.tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event == kind => handler(),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Payload-free events: one call covers everything skipped
                        tracing::warn!(event = %kind, skipped, "subscriber lagged behind");
                        handler();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Subscription { kind, handle }
    }

    /// Number of live receivers (handlers, streams and raw receivers)
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Handle to a handler registered with [`Notifier::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    handle: tokio::task::JoinHandle<()>,
}

impl Subscription {
    /// Event kind this subscription listens to
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Stop delivering events to the handler
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}
