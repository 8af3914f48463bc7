//! Durable pending-write queue, one per open scope.
//!
//! Every optimistic write lands here before any network attempt, so a
//! crash or dead connection never loses intent. The queue holds the latest
//! intent per record slot; an older queued value for the same slot is
//! superseded, not replayed. Entries leave the queue only when the backend
//! confirms them (ack or observed echo) or rejects them outright.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::merge::settles_pending;
use crate::core::record::{Collection, NodeValue};
use crate::core::scope::ScopeId;
use crate::core::time::Millis;
use crate::core::RecordKey;
use crate::vault::{get_json, put_json, Vault, VaultError};

/// One queued write: the full intended slot value, tombstones included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    pub collection: Collection,
    pub key: RecordKey,
    pub value: NodeValue,
    pub queued_at: Millis,
    /// Flush attempts so far, for logging and backoff decisions.
    #[serde(default)]
    pub attempts: u32,
    /// Consecutive rejections reported by the backend for this slot.
    #[serde(default)]
    pub rejections: u32,
}

/// Persisted form of the queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxSnapshot {
    pub writes: Vec<PendingWrite>,
}

/// The queue itself, keyed by record slot.
#[derive(Debug)]
pub struct Outbox {
    scope: ScopeId,
    writes: BTreeMap<(Collection, RecordKey), PendingWrite>,
    /// Running sum of [`Outbox::value_cost`] over all queued entries.
    bytes: usize,
}

impl Outbox {
    pub fn new(scope: ScopeId) -> Self {
        Self {
            scope,
            writes: BTreeMap::new(),
            bytes: 0,
        }
    }

    /// Byte cost one queued value contributes to the scope's queue budget.
    pub fn value_cost(value: &NodeValue) -> usize {
        match value.as_record() {
            Some(record) => record.encoded_len(),
            // Tombstones serialize as `null`.
            None => 4,
        }
    }

    fn vault_key(scope: &ScopeId) -> String {
        format!("outbox/{scope}")
    }

    /// Rebuild the queue for `scope` from the vault; empty when none stored.
    pub fn load(vault: &dyn Vault, scope: ScopeId) -> Result<Self, VaultError> {
        let snapshot: OutboxSnapshot =
            get_json(vault, &Self::vault_key(&scope))?.unwrap_or_default();
        let mut outbox = Self::new(scope);
        for write in snapshot.writes {
            outbox.enqueue(write);
        }
        Ok(outbox)
    }

    /// Like [`Outbox::load`], but an unreadable snapshot degrades to an
    /// empty queue with a warning instead of failing the scope open.
    pub fn load_or_default(vault: &dyn Vault, scope: ScopeId) -> Self {
        match Self::load(vault, scope.clone()) {
            Ok(outbox) => outbox,
            Err(err) => {
                tracing::warn!(scope = %scope, error = %err, "pending queue unreadable, starting empty");
                Self::new(scope)
            }
        }
    }

    /// Persist the current queue; an empty queue removes the vault entry.
    pub fn persist(&self, vault: &dyn Vault, wall: Millis) -> Result<(), VaultError> {
        let key = Self::vault_key(&self.scope);
        if self.writes.is_empty() {
            vault.remove(&key)
        } else {
            put_json(vault, &key, &self.snapshot(), wall)
        }
    }

    pub fn snapshot(&self) -> OutboxSnapshot {
        OutboxSnapshot {
            writes: self.writes.values().cloned().collect(),
        }
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Total byte cost of all queued values, for the per-scope queue budget.
    pub fn value_bytes(&self) -> usize {
        self.bytes
    }

    /// Queue a write, superseding any older intent for the same slot.
    pub fn enqueue(&mut self, write: PendingWrite) {
        self.bytes = self.bytes.saturating_add(Self::value_cost(&write.value));
        if let Some(old) = self
            .writes
            .insert((write.collection, write.key.clone()), write)
        {
            self.bytes = self.bytes.saturating_sub(Self::value_cost(&old.value));
        }
    }

    pub fn pending(&self, collection: Collection, key: &RecordKey) -> Option<&PendingWrite> {
        self.writes.get(&(collection, key.clone()))
    }

    /// Queued writes for one collection, in slot order.
    pub fn iter_collection(&self, collection: Collection) -> impl Iterator<Item = &PendingWrite> {
        self.writes
            .values()
            .filter(move |write| write.collection == collection)
    }

    /// Drop a write the backend confirmed via ack.
    pub fn confirm(&mut self, collection: Collection, key: &RecordKey) -> Option<PendingWrite> {
        let removed = self.writes.remove(&(collection, key.clone()))?;
        self.bytes = self.bytes.saturating_sub(Self::value_cost(&removed.value));
        Some(removed)
    }

    /// Record a rejection for this slot. The write is kept and will be
    /// replayed; callers advise the user once the count grows. Returns the
    /// new consecutive-rejection count, or `None` if nothing was pending.
    pub fn note_rejection(&mut self, collection: Collection, key: &RecordKey) -> Option<u32> {
        let write = self.writes.get_mut(&(collection, key.clone()))?;
        write.rejections = write.rejections.saturating_add(1);
        Some(write.rejections)
    }

    /// Apply an observed remote value: if it reflects the queued intent for
    /// this slot, the write is settled, removed, and handed back.
    pub fn settle(
        &mut self,
        collection: Collection,
        key: &RecordKey,
        observed: &NodeValue,
    ) -> Option<PendingWrite> {
        let pending = self.pending(collection, key)?;
        if settles_pending(&pending.value, observed) {
            self.confirm(collection, key)
        } else {
            None
        }
    }

    /// Writes to replay now, oldest intent first, capped at `max`.
    ///
    /// Entries stay queued; only confirmation removes them. Attempt counts
    /// are bumped so repeated replays are visible in logs.
    pub fn flush_batch(&mut self, max: usize) -> Vec<PendingWrite> {
        let mut order: Vec<(Millis, Collection, RecordKey)> = self
            .writes
            .values()
            .map(|w| (w.queued_at, w.collection, w.key.clone()))
            .collect();
        order.sort();
        order.truncate(max);

        let mut batch = Vec::with_capacity(order.len());
        for (_, collection, key) in order {
            if let Some(write) = self.writes.get_mut(&(collection, key)) {
                write.attempts = write.attempts.saturating_add(1);
                batch.push(write.clone());
            }
        }
        batch
    }
}
