//! Thread-safe, append-only item collection
//!
//! All access goes through [`SharedCollection::snapshot`] and
//! [`SharedCollection::append`]. The sequence sits behind a reader/writer
//! lock: snapshots share the read side, appends take the write side, so a
//! reader can never observe a half-finished append. The lock only ever guards
//! a `Vec` push or clone and is never held across an `.await`, so every
//! method is synchronous and callable from completion callbacks and
//! notification handlers.

use std::sync::{Arc, PoisonError, RwLock};

use crate::notifier::Notifier;
use crate::types::{EventKind, Item, ItemId};

/// Shared collection of fetched items (cloneable - all clones share one sequence)
#[derive(Clone)]
pub struct SharedCollection {
    items: Arc<RwLock<Vec<Arc<Item>>>>,
    notifier: Notifier,
}

impl SharedCollection {
    /// Create an empty collection announcing additions on `notifier`
    pub fn new(notifier: Notifier) -> Self {
        Self {
            items: Arc::new(RwLock::new(Vec::new())),
            notifier,
        }
    }

    /// Consistent copy of the current sequence, in insertion order
    ///
    /// May block briefly behind an in-progress append; never waits on I/O.
    pub fn snapshot(&self) -> Vec<Arc<Item>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Append an item
    ///
    /// The item is visible to every snapshot taken after this returns.
    /// `ContentAdded` is published once the write lock has been released.
    pub fn append(&self, item: Item) -> Arc<Item> {
        let item = Arc::new(item);
        let len = {
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            items.push(Arc::clone(&item));
            items.len()
        };

        tracing::debug!(item_id = item.id().0, source = %item.source(), len, "item appended");
        self.notifier.publish(EventKind::ContentAdded);
        item
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if no item has been appended yet
    pub fn is_empty(&self) -> bool {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Look up an item by ID
    pub fn get(&self, id: ItemId) -> Option<Arc<Item>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.id() == id)
            .cloned()
    }

    /// Notifier the collection publishes to
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl std::fmt::Debug for SharedCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCollection")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemStatus;
    use std::time::Duration;

    fn collection() -> SharedCollection {
        SharedCollection::new(Notifier::new(64))
    }

    #[test]
    fn append_is_visible_to_later_snapshots() {
        let collection = collection();
        assert!(collection.is_empty());

        let appended = collection.append(Item::ready("a", vec![1, 2, 3]));

        let snapshot = collection.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), appended.id());
        assert_eq!(snapshot[0].payload(), Some(&[1u8, 2, 3][..]));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn consecutive_snapshots_are_equal() {
        let collection = collection();
        collection.append(Item::ready("a", vec![]));
        collection.append(Item::failed("b"));

        let first = collection.snapshot();
        let second = collection.snapshot();
        assert_eq!(first, second);
    }

    #[test]
    fn snapshot_is_independent_of_later_appends() {
        let collection = collection();
        collection.append(Item::ready("a", vec![]));

        let before = collection.snapshot();
        collection.append(Item::ready("b", vec![]));

        assert_eq!(before.len(), 1);
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn get_finds_item_by_id() {
        let collection = collection();
        let item = collection.append(Item::failed("x"));

        let found = collection.get(item.id()).expect("item not found");
        assert_eq!(found.status(), ItemStatus::Failed);
        assert!(collection.get(ItemId(u64::MAX)).is_none());
    }

    #[tokio::test]
    async fn added_notification_follows_visibility() {
        let notifier = Notifier::new(64);
        let collection = SharedCollection::new(notifier.clone());
        let mut rx = notifier.receiver();

        collection.append(Item::ready("a", vec![]));

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no notification")
            .expect("channel closed");
        assert_eq!(event, EventKind::ContentAdded);
        assert_eq!(collection.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn handler_can_read_snapshot_when_notified() {
        let notifier = Notifier::new(64);
        let collection = SharedCollection::new(notifier.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let observed = collection.clone();
        let _subscription = notifier.subscribe(EventKind::ContentAdded, move || {
            tx.send(observed.snapshot().len()).ok();
        });

        collection.append(Item::ready("a", vec![]));

        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("handler did not run")
            .expect("handler dropped its sender");
        assert_eq!(seen, 1, "handler sees the item it was notified about");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_never_lose_items() {
        let collection = collection();
        let mut handles = Vec::new();

        for producer in 0..8 {
            let collection = collection.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..25 {
                    collection.append(Item::ready(format!("p{}-{}", producer, n), vec![]));
                    tokio::task::yield_now().await;
                }
            }));
        }

        // Readers racing the writers only ever see whole items
        let reader = {
            let collection = collection.clone();
            tokio::spawn(async move {
                let mut last = 0;
                for _ in 0..50 {
                    let len = collection.snapshot().len();
                    assert!(len >= last, "snapshot shrank from {} to {}", last, len);
                    last = len;
                    tokio::task::yield_now().await;
                }
            })
        };

        for handle in handles {
            handle.await.expect("producer panicked");
        }
        reader.await.expect("reader panicked");

        let snapshot = collection.snapshot();
        assert_eq!(snapshot.len(), 200);

        let mut ids: Vec<_> = snapshot.iter().map(|item| item.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 200, "duplicate item IDs in collection");
    }

    #[test]
    fn snapshot_outside_runtime() {
        let collection = collection();
        collection.append(Item::ready("a", vec![]));
        assert_eq!(collection.snapshot().len(), 1);
    }
}
