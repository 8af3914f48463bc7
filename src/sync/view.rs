//! Rendered state: confirmed remote cache plus pending overlay.
//!
//! Feature code never reads the outbox or the remote cache directly; it
//! sees the composition. A slot with a queued write renders the queued
//! intent (record or deletion); every other slot renders the confirmed
//! remote value. Events carry the composed result only.

use std::collections::BTreeMap;

use crate::core::merge::{merge, MergeOutcome};
use crate::core::record::{Collection, NodeValue, Record};
use crate::core::RecordKey;

use super::outbox::Outbox;

/// Non-blocking sync advisory shown alongside the data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// Backend reachable, nothing left to replay.
    Synced,
    /// Backend reachable, queued writes still replaying.
    Syncing { pending: usize },
    /// Backend unreachable; writes are held locally.
    Offline { pending: usize },
}

/// One change delivered to view subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewEvent {
    /// The rendered value of one slot changed; `None` means removed.
    Slot {
        collection: Collection,
        key: RecordKey,
        record: Option<Record>,
    },
    /// Connection/progress advisory changed.
    Status(SyncStatus),
    /// The backend keeps refusing a write; the data is still held locally.
    WriteAdvisory {
        collection: Collection,
        key: RecordKey,
        reason: String,
        rejections: u32,
    },
}

/// Confirmed remote cache for one collection of one scope.
#[derive(Debug, Default)]
pub struct CollectionView {
    confirmed: BTreeMap<RecordKey, Record>,
}

impl CollectionView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a delivered remote value into the confirmed cache.
    ///
    /// Returns whether the cache changed. Stale records (older stamp than
    /// the cached one) are ignored; tombstones always clear the slot.
    pub fn apply_remote(&mut self, key: &RecordKey, value: &NodeValue) -> bool {
        match merge(self.confirmed.get(key), value) {
            MergeOutcome::KeptCurrent => false,
            MergeOutcome::TookIncoming => match value {
                NodeValue::Record(record) => {
                    self.confirmed.insert(key.clone(), record.clone());
                    true
                }
                NodeValue::Absent => self.confirmed.remove(key).is_some(),
            },
        }
    }

    pub fn confirmed(&self, key: &RecordKey) -> Option<&Record> {
        self.confirmed.get(key)
    }

    pub fn len(&self) -> usize {
        self.confirmed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
    }

    /// The slot as the caller sees it: queued intent wins over confirmed.
    pub fn visible(&self, outbox: &Outbox, collection: Collection, key: &RecordKey) -> Option<Record> {
        match outbox.pending(collection, key) {
            Some(pending) => pending.value.as_record().cloned(),
            None => self.confirmed.get(key).cloned(),
        }
    }

    /// The whole collection as the caller sees it, keyed slots in order.
    pub fn rendered(&self, outbox: &Outbox, collection: Collection) -> Vec<(RecordKey, Record)> {
        let mut slots = self.confirmed.clone();
        for write in outbox.iter_collection(collection) {
            match write.value.as_record() {
                Some(record) => {
                    slots.insert(write.key.clone(), record.clone());
                }
                None => {
                    slots.remove(&write.key);
                }
            }
        }
        slots.into_iter().collect()
    }
}
