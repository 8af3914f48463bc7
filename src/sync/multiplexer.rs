//! Subscription multiplexer: one underlying store watch per node path.
//!
//! Feature code wants one logical live view per (scope, collection); the
//! store hands out raw per-path subscriptions. This keeps the mapping
//! exact: attaching to an already-watched path is a no-op, and a scope
//! switch tears every watch down before the next scope attaches, so
//! stale-scope events cannot flow into new-scope views.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam::channel::Sender;

use crate::core::scope::NodePath;
use crate::remote::{NodeEvent, NodeStore, NodeWatch, StoreError};

pub struct Multiplexer {
    store: Arc<dyn NodeStore>,
    watches: BTreeMap<NodePath, Box<dyn NodeWatch>>,
}

impl Multiplexer {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self {
            store,
            watches: BTreeMap::new(),
        }
    }

    /// Subscribe to `path` unless already subscribed.
    ///
    /// Returns whether a new underlying subscription was created; `false`
    /// means the existing watch keeps serving this path.
    pub fn attach(&mut self, path: &NodePath, events: Sender<NodeEvent>) -> Result<bool, StoreError> {
        if self.watches.contains_key(path) {
            return Ok(false);
        }
        let watch = self.store.subscribe(path, events)?;
        self.watches.insert(path.clone(), watch);
        Ok(true)
    }

    /// Cancel the watch for one path. Returns whether one existed.
    pub fn detach(&mut self, path: &NodePath) -> bool {
        self.watches.remove(path).is_some()
    }

    /// Cancel every watch. Dropping the handles cancels delivery at the
    /// store; events already queued for delivery are the caller's to
    /// discard by path.
    pub fn detach_all(&mut self) {
        self.watches.clear();
    }

    pub fn attached(&self, path: &NodePath) -> bool {
        self.watches.contains_key(path)
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    use crate::core::record::{NodeValue, Record, RecordBody};
    use crate::core::scope::PartitionPath;
    use crate::core::time::Millis;
    use crate::core::{Collection, RecordKey};
    use crate::remote::MemoryStore;

    fn expense(at: u64) -> NodeValue {
        NodeValue::Record(Record::new(
            RecordBody::Expense {
                category: "food".into(),
                amount: 1.0,
                note: None,
            },
            Millis(at),
        ))
    }

    fn key(raw: &str) -> RecordKey {
        RecordKey::parse(raw).unwrap()
    }

    #[test]
    fn attach_is_idempotent_per_path() {
        let store = MemoryStore::new();
        let path = PartitionPath::shared("public").collection(Collection::Expenses);
        store.inject(&path, &key("a"), expense(10)).unwrap();

        let mut mux = Multiplexer::new(Arc::new(store));
        let (tx, rx) = unbounded();

        assert!(mux.attach(&path, tx.clone()).unwrap());
        assert!(!mux.attach(&path, tx).unwrap());
        assert_eq!(mux.watch_count(), 1);

        // Only one replay of the existing child, not one per attach call.
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn detach_all_stops_delivery_before_reattach() {
        let store = MemoryStore::new();
        let path = PartitionPath::shared("public").collection(Collection::Goals);

        let mut mux = Multiplexer::new(Arc::new(store.clone()));
        let (tx, rx) = unbounded();
        mux.attach(&path, tx).unwrap();
        mux.detach_all();
        assert_eq!(mux.watch_count(), 0);

        store.inject(&path, &key("g1"), expense(10)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn watches_do_not_cross_partitions() {
        let store = MemoryStore::new();
        let ours = PartitionPath::shared("team-a").collection(Collection::Expenses);
        let theirs = PartitionPath::shared("team-b").collection(Collection::Expenses);

        let mut mux = Multiplexer::new(Arc::new(store.clone()));
        let (tx, rx) = unbounded();
        mux.attach(&ours, tx).unwrap();

        store.inject(&theirs, &key("x"), expense(10)).unwrap();
        assert!(rx.try_recv().is_err());

        store.inject(&ours, &key("y"), expense(20)).unwrap();
        assert_eq!(rx.try_recv().unwrap().key, key("y"));
    }
}
