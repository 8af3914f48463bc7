//! In-memory node store with scriptable connectivity.
//!
//! The reference backend for tests: applies writes immediately, fans out
//! change events to subscribers, and lets a test take the store offline,
//! hold acknowledgements back, or inject writes as if another client made
//! them. Clones share the same state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam::channel::Sender;

use crate::core::record::{NodeValue, Record};
use crate::core::scope::NodePath;
use crate::core::RecordKey;

use super::{AckOutcome, Connectivity, NodeEvent, NodeStore, NodeWatch, StoreError, WriteAck};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    nodes: BTreeMap<NodePath, BTreeMap<RecordKey, Record>>,
    watches: Vec<WatchEntry>,
    conn_watchers: Vec<Sender<Connectivity>>,
    next_watch_id: u64,
    online: bool,
    reconnectable: bool,
    hold_acks: bool,
    held_acks: Vec<(Sender<WriteAck>, WriteAck)>,
    reject_reason: Option<String>,
    write_count: usize,
}

struct WatchEntry {
    id: u64,
    path: NodePath,
    events: Sender<NodeEvent>,
}

impl StoreState {
    /// Deliver one child value to every watch on `path`, pruning dead ones.
    fn fire(&mut self, path: &NodePath, key: &RecordKey, value: &NodeValue) {
        self.watches.retain(|watch| {
            if watch.path != *path {
                return true;
            }
            watch
                .events
                .send(NodeEvent {
                    path: path.clone(),
                    key: key.clone(),
                    value: value.clone(),
                })
                .is_ok()
        });
    }

    /// Replay every child of every watched node, as a backend re-sync does
    /// after the connection comes back.
    fn refire_all(&mut self) {
        let snapshot: Vec<(NodePath, RecordKey, NodeValue)> = self
            .watches
            .iter()
            .flat_map(|watch| {
                self.nodes
                    .get(&watch.path)
                    .into_iter()
                    .flat_map(|children| {
                        children.iter().map(|(key, record)| {
                            (
                                watch.path.clone(),
                                key.clone(),
                                NodeValue::Record(record.clone()),
                            )
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        for (path, key, value) in snapshot {
            self.fire(&path, &key, &value);
        }
    }

    fn notify_connectivity(&mut self) {
        let state = if self.online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        self.conn_watchers.retain(|tx| tx.send(state).is_ok());
    }

    fn deliver_ack(&mut self, acks: Sender<WriteAck>, ack: WriteAck) {
        if self.hold_acks {
            self.held_acks.push((acks, ack));
        } else {
            let _ = acks.send(ack);
        }
    }
}

impl MemoryStore {
    /// A store that starts online.
    pub fn new() -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.inner.lock() {
            state.online = true;
            state.reconnectable = true;
        }
        store
    }

    /// A store that starts offline and refuses reconnection until
    /// [`MemoryStore::set_reconnectable`] allows it.
    pub fn unreachable() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Take the store online or offline, notifying connectivity watchers.
    /// Coming online replays current state to all subscribers.
    pub fn set_online(&self, online: bool) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.online == online {
            return Ok(());
        }
        state.online = online;
        state.notify_connectivity();
        if online {
            state.refire_all();
        }
        Ok(())
    }

    pub fn set_reconnectable(&self, reconnectable: bool) -> Result<(), StoreError> {
        self.lock()?.reconnectable = reconnectable;
        Ok(())
    }

    /// Park acknowledgements instead of delivering them.
    pub fn hold_acks(&self) -> Result<(), StoreError> {
        self.lock()?.hold_acks = true;
        Ok(())
    }

    /// Deliver every parked acknowledgement and resume immediate delivery.
    pub fn release_acks(&self) -> Result<(), StoreError> {
        let held = {
            let mut state = self.lock()?;
            state.hold_acks = false;
            std::mem::take(&mut state.held_acks)
        };
        for (tx, ack) in held {
            let _ = tx.send(ack);
        }
        Ok(())
    }

    /// Discard every parked acknowledgement; models acks that never arrive.
    pub fn drop_held_acks(&self) -> Result<(), StoreError> {
        self.lock()?.held_acks.clear();
        Ok(())
    }

    /// When set, writes are not applied and are acknowledged as rejected.
    pub fn set_reject_reason(&self, reason: Option<String>) -> Result<(), StoreError> {
        self.lock()?.reject_reason = reason;
        Ok(())
    }

    /// Apply a write as if another client issued it. Subscribers see the
    /// change only while online; offline stores pick it up on re-sync.
    pub fn inject(
        &self,
        path: &NodePath,
        key: &RecordKey,
        value: NodeValue,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        match &value {
            NodeValue::Record(record) => {
                state
                    .nodes
                    .entry(path.clone())
                    .or_default()
                    .insert(key.clone(), record.clone());
            }
            NodeValue::Absent => {
                if let Some(children) = state.nodes.get_mut(path) {
                    children.remove(key);
                }
            }
        }
        if state.online {
            state.fire(path, key, &value);
        }
        Ok(())
    }

    /// Current children of a node, for assertions.
    pub fn contents(&self, path: &NodePath) -> Result<Vec<(RecordKey, Record)>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .nodes
            .get(path)
            .map(|children| {
                children
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Number of writes accepted so far.
    pub fn write_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.write_count)
    }
}

struct MemoryWatch {
    id: u64,
    path: NodePath,
    inner: Arc<Mutex<StoreState>>,
}

impl NodeWatch for MemoryWatch {
    fn path(&self) -> &NodePath {
        &self.path
    }
}

impl Drop for MemoryWatch {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.lock() {
            state.watches.retain(|watch| watch.id != self.id);
        }
    }
}

impl NodeStore for MemoryStore {
    fn write(
        &self,
        path: &NodePath,
        key: &RecordKey,
        value: NodeValue,
        acks: Sender<WriteAck>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.online {
            return Err(StoreError::Offline);
        }
        state.write_count += 1;

        if let Some(reason) = state.reject_reason.clone() {
            let ack = WriteAck {
                path: path.clone(),
                key: key.clone(),
                outcome: AckOutcome::Rejected { reason },
            };
            state.deliver_ack(acks, ack);
            return Ok(());
        }

        match &value {
            NodeValue::Record(record) => {
                state
                    .nodes
                    .entry(path.clone())
                    .or_default()
                    .insert(key.clone(), record.clone());
            }
            NodeValue::Absent => {
                if let Some(children) = state.nodes.get_mut(path) {
                    children.remove(key);
                }
            }
        }
        state.fire(path, key, &value);

        let ack = WriteAck {
            path: path.clone(),
            key: key.clone(),
            outcome: AckOutcome::Committed,
        };
        state.deliver_ack(acks, ack);
        Ok(())
    }

    fn read_once(&self, path: &NodePath, key: &RecordKey) -> Result<NodeValue, StoreError> {
        let state = self.lock()?;
        if !state.online {
            return Err(StoreError::Offline);
        }
        Ok(state
            .nodes
            .get(path)
            .and_then(|children| children.get(key))
            .map(|record| NodeValue::Record(record.clone()))
            .unwrap_or(NodeValue::Absent))
    }

    fn subscribe(
        &self,
        path: &NodePath,
        events: Sender<NodeEvent>,
    ) -> Result<Box<dyn NodeWatch>, StoreError> {
        let mut state = self.lock()?;
        let id = state.next_watch_id;
        state.next_watch_id = state.next_watch_id.saturating_add(1);
        state.watches.push(WatchEntry {
            id,
            path: path.clone(),
            events: events.clone(),
        });

        // One event per existing child, delivered up front.
        if state.online
            && let Some(children) = state.nodes.get(path)
        {
            let snapshot: Vec<(RecordKey, Record)> = children
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, record) in snapshot {
                let _ = events.send(NodeEvent {
                    path: path.clone(),
                    key,
                    value: NodeValue::Record(record),
                });
            }
        }

        Ok(Box::new(MemoryWatch {
            id,
            path: path.clone(),
            inner: Arc::clone(&self.inner),
        }))
    }

    fn watch_connectivity(&self, tx: Sender<Connectivity>) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let current = if state.online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        let _ = tx.send(current);
        state.conn_watchers.push(tx);
        Ok(())
    }

    fn online(&self) -> bool {
        self.lock().map(|state| state.online).unwrap_or(false)
    }

    fn reconnect(&self) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        if state.online {
            return Ok(true);
        }
        if !state.reconnectable {
            return Ok(false);
        }
        state.online = true;
        state.notify_connectivity();
        state.refire_all();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    use crate::core::record::RecordBody;
    use crate::core::scope::PartitionPath;
    use crate::core::time::Millis;
    use crate::core::Collection;

    fn path() -> NodePath {
        PartitionPath::shared("public").collection(Collection::Expenses)
    }

    fn key(raw: &str) -> RecordKey {
        RecordKey::parse(raw).unwrap()
    }

    fn expense(amount: f64, at: u64) -> NodeValue {
        NodeValue::Record(Record::new(
            RecordBody::Expense {
                category: "food".into(),
                amount,
                note: None,
            },
            Millis(at),
        ))
    }

    #[test]
    fn subscribe_replays_existing_children_then_changes() {
        let store = MemoryStore::new();
        store.inject(&path(), &key("a"), expense(1.0, 10)).unwrap();
        store.inject(&path(), &key("b"), expense(2.0, 20)).unwrap();

        let (tx, rx) = unbounded();
        let _watch = store.subscribe(&path(), tx).unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.key, key("a"));
        assert_eq!(second.key, key("b"));
        assert!(rx.try_recv().is_err());

        store.inject(&path(), &key("c"), expense(3.0, 30)).unwrap();
        assert_eq!(rx.try_recv().unwrap().key, key("c"));
    }

    #[test]
    fn dropping_the_watch_stops_delivery() {
        let store = MemoryStore::new();
        let (tx, rx) = unbounded();
        let watch = store.subscribe(&path(), tx).unwrap();
        drop(watch);

        store.inject(&path(), &key("a"), expense(1.0, 10)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn writes_apply_fan_out_and_ack() {
        let store = MemoryStore::new();
        let (ev_tx, ev_rx) = unbounded();
        let _watch = store.subscribe(&path(), ev_tx).unwrap();

        let (ack_tx, ack_rx) = unbounded();
        store
            .write(&path(), &key("a"), expense(5.0, 50), ack_tx)
            .unwrap();

        assert_eq!(ev_rx.try_recv().unwrap().key, key("a"));
        let ack = ack_rx.try_recv().unwrap();
        assert_eq!(ack.key, key("a"));
        assert_eq!(ack.outcome, AckOutcome::Committed);
        assert_eq!(store.contents(&path()).unwrap().len(), 1);
    }

    #[test]
    fn absent_write_deletes_and_fans_out() {
        let store = MemoryStore::new();
        store.inject(&path(), &key("a"), expense(1.0, 10)).unwrap();

        let (ev_tx, ev_rx) = unbounded();
        let _watch = store.subscribe(&path(), ev_tx).unwrap();
        let _ = ev_rx.try_recv().unwrap(); // replay of "a"

        let (ack_tx, _ack_rx) = unbounded();
        store
            .write(&path(), &key("a"), NodeValue::Absent, ack_tx)
            .unwrap();

        let event = ev_rx.try_recv().unwrap();
        assert!(event.value.is_absent());
        assert!(store.contents(&path()).unwrap().is_empty());
    }

    #[test]
    fn read_once_snapshots_the_slot() {
        let store = MemoryStore::new();
        assert!(store.read_once(&path(), &key("a")).unwrap().is_absent());

        store.inject(&path(), &key("a"), expense(1.0, 10)).unwrap();
        assert!(!store.read_once(&path(), &key("a")).unwrap().is_absent());

        store.set_online(false).unwrap();
        assert_eq!(
            store.read_once(&path(), &key("a")).unwrap_err(),
            StoreError::Offline
        );
    }

    #[test]
    fn offline_store_refuses_writes_and_replays_on_reconnect() {
        let store = MemoryStore::new();
        store.inject(&path(), &key("a"), expense(1.0, 10)).unwrap();

        let (ev_tx, ev_rx) = unbounded();
        let _watch = store.subscribe(&path(), ev_tx).unwrap();
        let _ = ev_rx.try_recv().unwrap();

        store.set_online(false).unwrap();
        let (ack_tx, _) = unbounded();
        assert_eq!(
            store
                .write(&path(), &key("b"), expense(2.0, 20), ack_tx)
                .unwrap_err(),
            StoreError::Offline
        );

        // Another client writes while we are away.
        store.inject(&path(), &key("c"), expense(3.0, 30)).unwrap();
        assert!(ev_rx.try_recv().is_err());

        assert!(store.reconnect().unwrap());
        let replayed: Vec<_> = ev_rx.try_iter().map(|e| e.key).collect();
        assert!(replayed.contains(&key("a")));
        assert!(replayed.contains(&key("c")));
    }

    #[test]
    fn held_acks_are_released_in_order() {
        let store = MemoryStore::new();
        store.hold_acks().unwrap();

        let (ack_tx, ack_rx) = unbounded();
        store
            .write(&path(), &key("a"), expense(1.0, 10), ack_tx.clone())
            .unwrap();
        store
            .write(&path(), &key("b"), expense(2.0, 20), ack_tx)
            .unwrap();
        assert!(ack_rx.try_recv().is_err());

        store.release_acks().unwrap();
        assert_eq!(ack_rx.try_recv().unwrap().key, key("a"));
        assert_eq!(ack_rx.try_recv().unwrap().key, key("b"));
    }

    #[test]
    fn rejection_acks_without_applying() {
        let store = MemoryStore::new();
        store
            .set_reject_reason(Some("permission denied".into()))
            .unwrap();

        let (ack_tx, ack_rx) = unbounded();
        store
            .write(&path(), &key("a"), expense(1.0, 10), ack_tx)
            .unwrap();

        match ack_rx.try_recv().unwrap().outcome {
            AckOutcome::Rejected { reason } => assert_eq!(reason, "permission denied"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(store.contents(&path()).unwrap().is_empty());
    }

    #[test]
    fn unreachable_store_stays_down_until_allowed() {
        let store = MemoryStore::unreachable();
        assert!(!store.online());
        assert!(!store.reconnect().unwrap());

        store.set_reconnectable(true).unwrap();
        assert!(store.reconnect().unwrap());
        assert!(store.online());
    }
}
