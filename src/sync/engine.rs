//! The sync engine - the central coordinator.
//!
//! Owns all per-scope state, the write clock, and the adapter watches.
//! The serialization point for all mutations - runs on a single thread;
//! adapter events, acks, and connectivity changes are fed in as plain
//! method calls by the runtime loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam::channel::Sender;
use thiserror::Error;

use crate::config::Config;
use crate::core::record::{Collection, NodeValue, Record, RecordBody};
use crate::core::scope::{
    resolve, AuthSnapshot, NodePath, PartitionPath, ScopeId, Space,
};
use crate::core::time::{Clock, Millis};
use crate::core::{CoreError, GuestId, RecordKey};
use crate::error::Error;
use crate::remote::{AckOutcome, Connectivity, NodeEvent, NodeStore, StoreError, WriteAck};
use crate::vault::{get_json, put_json, Vault, VaultEntry};

use super::broadcast::{Broadcaster, Subscription};
use super::ledger::{DropLimits, Ledger};
use super::multiplexer::Multiplexer;
use super::outbox::{Outbox, PendingWrite};
use super::view::{CollectionView, SyncStatus, ViewEvent};

/// Vault key holding the durable guest identity.
const GUEST_IDENTITY_KEY: &str = "identity/guest";

/// Engine-level refusal states.
///
/// Everything here is raised before any network traffic; connectivity
/// problems are never surfaced as errors, only as [`SyncStatus`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("scope `{scope}` is not open")]
    ScopeNotOpen { scope: ScopeId },

    #[error("a signed-in session is required before this space is usable")]
    AuthRequired,

    #[error("pending queue for scope `{scope}` is full ({cap} writes)")]
    QueueFull { scope: ScopeId, cap: usize },

    #[error("pending queue for scope `{scope}` would exceed {cap} bytes")]
    QueueBytes { scope: ScopeId, cap: usize },

    #[error("sync runtime unavailable: {reason}")]
    Runtime { reason: String },
}

impl EngineError {
    pub fn transience(&self) -> crate::error::Transience {
        use crate::error::Transience;
        match self {
            EngineError::ScopeNotOpen { .. } => Transience::Permanent,
            EngineError::AuthRequired => Transience::Permanent,
            // A drained queue accepts the same write later.
            EngineError::QueueFull { .. } => Transience::Retryable,
            EngineError::QueueBytes { .. } => Transience::Retryable,
            EngineError::Runtime { .. } => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> crate::error::Effect {
        // Refusals happen before any local or remote mutation.
        crate::error::Effect::None
    }
}

/// Result of a scope switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    /// The newly opened scope; `None` when the space has no usable
    /// partition yet (anonymous personal space without a guest session).
    pub scope: Option<ScopeId>,
    /// Any stale "please sign in" affordance should be cleared.
    pub clear_stale_auth_ui: bool,
}

fn status_for(online: bool, pending: usize) -> SyncStatus {
    if !online {
        SyncStatus::Offline { pending }
    } else if pending == 0 {
        SyncStatus::Synced
    } else {
        SyncStatus::Syncing { pending }
    }
}

/// Everything the engine holds for one open scope.
struct ScopeState {
    partition: PartitionPath,
    outbox: Outbox,
    ledger: Ledger,
    views: BTreeMap<Collection, CollectionView>,
    events: Broadcaster<ViewEvent>,
    last_status: SyncStatus,
}

impl ScopeState {
    /// The slot as callers see it: queued intent wins over confirmed.
    fn visible(&self, collection: Collection, key: &RecordKey) -> Option<Record> {
        self.views
            .get(&collection)
            .and_then(|view| view.visible(&self.outbox, collection, key))
    }

    fn publish(&self, event: ViewEvent) {
        if let Err(err) = self.events.publish(event) {
            tracing::warn!(scope = %self.outbox.scope(), error = %err, "view subscribers unreachable");
        }
    }

    /// Recompute the advisory status and emit it if it changed.
    fn refresh_status(&mut self, online: bool) {
        let status = status_for(online, self.outbox.len());
        if status != self.last_status {
            self.last_status = status;
            self.publish(ViewEvent::Status(status));
        }
    }
}

/// The engine coordinator.
///
/// Owns scope state and coordinates between callers, the pending queues,
/// the rendered views, and the node store adapter.
pub struct Engine {
    store: Arc<dyn NodeStore>,
    vault: Arc<dyn Vault>,
    config: Config,

    /// Per-scope state, keyed by partition-derived scope id.
    scopes: BTreeMap<ScopeId, ScopeState>,

    /// Routing table from watched node path to its owner.
    paths: BTreeMap<NodePath, (ScopeId, Collection)>,

    /// Write clock; observes remote stamps so local stamps stay ahead.
    clock: Clock,

    /// One underlying watch per attached path.
    mux: Multiplexer,

    connectivity: Connectivity,

    /// Senders handed to the adapter; the runtime owns the receivers.
    node_events: Sender<NodeEvent>,
    acks: Sender<WriteAck>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn NodeStore>,
        vault: Arc<dyn Vault>,
        config: Config,
        node_events: Sender<NodeEvent>,
        acks: Sender<WriteAck>,
    ) -> Self {
        let connectivity = if store.online() {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        Engine {
            mux: Multiplexer::new(Arc::clone(&store)),
            store,
            vault,
            config,
            scopes: BTreeMap::new(),
            paths: BTreeMap::new(),
            clock: Clock::new(),
            connectivity,
            node_events,
            acks,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    fn scope_state(&self, scope: &ScopeId) -> Result<&ScopeState, EngineError> {
        self.scopes
            .get(scope)
            .ok_or_else(|| EngineError::ScopeNotOpen {
                scope: scope.clone(),
            })
    }

    fn scope_state_mut(&mut self, scope: &ScopeId) -> Result<&mut ScopeState, EngineError> {
        self.scopes
            .get_mut(scope)
            .ok_or_else(|| EngineError::ScopeNotOpen {
                scope: scope.clone(),
            })
    }

    // ----- identity & scope lifecycle -----

    /// Load the durable guest identity, minting one on first use.
    ///
    /// An unreadable stored identity degrades to a fresh one with a warning
    /// rather than failing the caller.
    pub fn ensure_guest(&mut self) -> Result<GuestId, Error> {
        let vault = Arc::clone(&self.vault);
        match get_json::<GuestId>(vault.as_ref(), GUEST_IDENTITY_KEY) {
            Ok(Some(guest)) => return Ok(guest),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "stored guest identity unreadable, minting a new one");
            }
        }
        let guest = GuestId::generate();
        put_json(vault.as_ref(), GUEST_IDENTITY_KEY, &guest, self.clock.stamp())?;
        tracing::info!(guest = %guest, "guest identity minted");
        Ok(guest)
    }

    /// Close `from` (if any), resolve the new space, and open its scope.
    ///
    /// The old scope's watches are released before any new watch attaches,
    /// so stale-scope events cannot land in new-scope views. Pending writes
    /// of the old scope stay durable in the vault.
    pub fn switch(
        &mut self,
        from: Option<&ScopeId>,
        space: &Space,
        auth: &AuthSnapshot,
    ) -> Result<SwitchOutcome, Error> {
        if let Some(previous) = from {
            self.close_scope(previous);
        }
        let resolution = resolve(space, auth);
        let Some(partition) = resolution.partition else {
            if resolution.requires_auth {
                return Err(EngineError::AuthRequired.into());
            }
            return Ok(SwitchOutcome {
                scope: None,
                clear_stale_auth_ui: resolution.clear_stale_auth_ui,
            });
        };
        let scope = self.open_scope(partition)?;
        Ok(SwitchOutcome {
            scope: Some(scope),
            clear_stale_auth_ui: resolution.clear_stale_auth_ui,
        })
    }

    /// Open the scope for `partition`, reloading its durable state and
    /// attaching one watch per collection. Idempotent per partition.
    pub fn open_scope(&mut self, partition: PartitionPath) -> Result<ScopeId, Error> {
        let scope = ScopeId::from_partition(&partition);
        if self.scopes.contains_key(&scope) {
            return Ok(scope);
        }

        let vault = Arc::clone(&self.vault);
        let online = self.connectivity.is_online();
        let outbox = Outbox::load_or_default(vault.as_ref(), scope.clone());
        let ledger = Ledger::load_or_default(vault.as_ref(), scope.clone(), &self.config.limits);
        let mut views = BTreeMap::new();
        for collection in Collection::ALL {
            views.insert(collection, CollectionView::new());
        }
        let pending = outbox.len();
        let state = ScopeState {
            partition: partition.clone(),
            outbox,
            ledger,
            views,
            events: Broadcaster::new(
                self.config.limits.max_view_subscribers,
                self.config.limits.subscriber_queue_events,
            ),
            last_status: status_for(online, pending),
        };
        self.scopes.insert(scope.clone(), state);

        for collection in Collection::ALL {
            let path = partition.collection(collection);
            self.paths.insert(path.clone(), (scope.clone(), collection));
            if let Err(err) = self.mux.attach(&path, self.node_events.clone()) {
                tracing::warn!(path = %path, error = %err, "watch attach failed, will retry on reconnect");
            }
        }
        tracing::info!(scope = %scope, pending, "scope opened");

        if online && pending > 0 {
            self.flush_scope(&scope);
        }
        Ok(scope)
    }

    /// Detach the scope's watches and drop its in-memory state.
    ///
    /// The vault copies of its queue and ledger survive for a later revisit.
    pub fn close_scope(&mut self, scope: &ScopeId) -> bool {
        if self.scopes.remove(scope).is_none() {
            return false;
        }
        let stale: Vec<NodePath> = self
            .paths
            .iter()
            .filter(|(_, (owner, _))| owner == scope)
            .map(|(path, _)| path.clone())
            .collect();
        for path in stale {
            self.mux.detach(&path);
            self.paths.remove(&path);
        }
        tracing::info!(scope = %scope, "scope closed");
        true
    }

    pub fn is_open(&self, scope: &ScopeId) -> bool {
        self.scopes.contains_key(scope)
    }

    // ----- writes -----

    /// Queue an optimistic write and submit it if the backend is reachable.
    ///
    /// The record is durable in the vault and visible to readers before any
    /// network traffic. A missing `key` mints one. Connectivity problems
    /// are not errors; only validation and queue caps refuse a write.
    pub fn write(
        &mut self,
        scope: &ScopeId,
        key: Option<RecordKey>,
        body: RecordBody,
    ) -> Result<RecordKey, Error> {
        let collection = body.collection();
        let key = match key {
            Some(key) => key,
            None => RecordKey::generate(self.config.generated_key_len),
        };
        self.config
            .limits
            .check_body(&key, &body)
            .map_err(CoreError::from)?;

        let now = self.clock.stamp();
        let record = match self.scope_state(scope)?.visible(collection, &key) {
            // Full replace, but creation time is carried forward.
            Some(mut prior) => {
                prior.body = body;
                prior.stamp_update(now);
                prior
            }
            None => Record::new(body, now),
        };
        let max_record = self.config.limits.max_record_bytes;
        let encoded = record.encoded_len();
        if encoded > max_record {
            return Err(CoreError::from(crate::core::InvalidRecord {
                key: key.to_string(),
                reason: format!("encoded record is {encoded} bytes (limit {max_record})"),
            })
            .into());
        }

        self.queue_and_submit(scope, collection, key.clone(), NodeValue::Record(record), now)?;
        Ok(key)
    }

    /// Queue a tombstone for one slot; the key disappears from the rendered
    /// view immediately.
    pub fn delete(
        &mut self,
        scope: &ScopeId,
        collection: Collection,
        key: &RecordKey,
    ) -> Result<(), Error> {
        let now = self.clock.stamp();
        self.queue_and_submit(scope, collection, key.clone(), NodeValue::Absent, now)
    }

    fn queue_and_submit(
        &mut self,
        scope: &ScopeId,
        collection: Collection,
        key: RecordKey,
        value: NodeValue,
        now: Millis,
    ) -> Result<(), Error> {
        let max_entries = self.config.limits.max_pending_writes_per_scope;
        let max_bytes = self.config.limits.max_outbox_bytes;
        let online = self.connectivity.is_online();
        let store = Arc::clone(&self.store);
        let vault = Arc::clone(&self.vault);
        let acks = self.acks.clone();

        let state = self.scope_state_mut(scope)?;
        let previous = state.outbox.pending(collection, &key).cloned();
        if previous.is_none() && state.outbox.len() >= max_entries {
            return Err(EngineError::QueueFull {
                scope: scope.clone(),
                cap: max_entries,
            }
            .into());
        }
        let superseded_cost = previous
            .as_ref()
            .map(|write| Outbox::value_cost(&write.value))
            .unwrap_or(0);
        let projected = state
            .outbox
            .value_bytes()
            .saturating_sub(superseded_cost)
            .saturating_add(Outbox::value_cost(&value));
        if projected > max_bytes {
            return Err(EngineError::QueueBytes {
                scope: scope.clone(),
                cap: max_bytes,
            }
            .into());
        }

        let before = state.visible(collection, &key);
        state.outbox.enqueue(PendingWrite {
            collection,
            key: key.clone(),
            value: value.clone(),
            queued_at: now,
            attempts: 0,
            rejections: 0,
        });
        // Durable before any network attempt. A failed persist rolls the
        // queue back so the caller sees no effect at all.
        if let Err(err) = state.outbox.persist(vault.as_ref(), now) {
            match previous {
                Some(write) => state.outbox.enqueue(write),
                None => {
                    state.outbox.confirm(collection, &key);
                }
            }
            return Err(err.into());
        }
        let after = state.visible(collection, &key);
        if before != after {
            state.publish(ViewEvent::Slot {
                collection,
                key: key.clone(),
                record: after,
            });
        }
        state.refresh_status(online);
        let path = state.partition.collection(collection);

        if online && let Err(err) = store.write(&path, &key, value, acks) {
            match err {
                StoreError::Offline => self.note_offline(),
                other => {
                    tracing::warn!(path = %path, key = %key, error = %other, "write submission failed, queued for retry");
                }
            }
        }
        Ok(())
    }

    // ----- reads -----

    /// One slot as currently rendered: queued intent over confirmed value.
    pub fn record(
        &self,
        scope: &ScopeId,
        collection: Collection,
        key: &RecordKey,
    ) -> Result<Option<Record>, Error> {
        Ok(self.scope_state(scope)?.visible(collection, key))
    }

    /// Whole collection as currently rendered, in key order.
    pub fn records(
        &self,
        scope: &ScopeId,
        collection: Collection,
    ) -> Result<Vec<(RecordKey, Record)>, Error> {
        let state = self.scope_state(scope)?;
        Ok(state
            .views
            .get(&collection)
            .map(|view| view.rendered(&state.outbox, collection))
            .unwrap_or_default())
    }

    pub fn pending_count(&self, scope: &ScopeId) -> Result<usize, Error> {
        Ok(self.scope_state(scope)?.outbox.len())
    }

    pub fn status(&self, scope: &ScopeId) -> Result<SyncStatus, Error> {
        Ok(self.scope_state(scope)?.last_status)
    }

    /// Subscribe to a scope's view events; the current status arrives first.
    pub fn subscribe_view(&self, scope: &ScopeId) -> Result<Subscription<ViewEvent>, Error> {
        let state = self.scope_state(scope)?;
        Ok(state
            .events
            .subscribe(Some(ViewEvent::Status(state.last_status)))?)
    }

    // ----- ledger -----

    pub fn ledger_value(&self, scope: &ScopeId) -> Result<u64, Error> {
        Ok(self.scope_state(scope)?.ledger.value())
    }

    pub fn subscribe_ledger(&self, scope: &ScopeId) -> Result<Subscription<u64>, Error> {
        Ok(self.scope_state(scope)?.ledger.subscribe()?)
    }

    pub fn ledger_increment(&mut self, scope: &ScopeId, delta: f64) -> Result<u64, Error> {
        let vault = Arc::clone(&self.vault);
        let wall = self.clock.stamp();
        let state = self.scope_state_mut(scope)?;
        Ok(state.ledger.increment(vault.as_ref(), delta, wall)?)
    }

    pub fn ledger_decrement(
        &mut self,
        scope: &ScopeId,
        delta: f64,
        limits: DropLimits,
    ) -> Result<u64, Error> {
        let vault = Arc::clone(&self.vault);
        let wall = self.clock.stamp();
        let state = self.scope_state_mut(scope)?;
        Ok(state.ledger.decrement(vault.as_ref(), delta, limits, wall)?)
    }

    pub fn ledger_set(&mut self, scope: &ScopeId, value: u64) -> Result<u64, Error> {
        let vault = Arc::clone(&self.vault);
        let wall = self.clock.stamp();
        let state = self.scope_state_mut(scope)?;
        Ok(state.ledger.set(vault.as_ref(), value, wall)?)
    }

    pub fn ledger_ensure_minimum(&mut self, scope: &ScopeId, value: u64) -> Result<u64, Error> {
        let vault = Arc::clone(&self.vault);
        let wall = self.clock.stamp();
        let state = self.scope_state_mut(scope)?;
        Ok(state.ledger.ensure_minimum(vault.as_ref(), value, wall)?)
    }

    /// Fold in a ledger change another tab/process persisted for `scope`.
    ///
    /// `raw` is the serialized vault entry as stored on disk. Malformed
    /// payloads are ignored with a warning; nothing is written back.
    pub fn handle_external_ledger_change(&mut self, scope: &ScopeId, raw: &str) {
        let Ok(state) = self.scope_state_mut(scope) else {
            tracing::debug!(scope = %scope, "ledger change for closed scope dropped");
            return;
        };
        match parse_ledger_entry(raw) {
            Some(value) => state.ledger.observe_external(value),
            None => {
                tracing::warn!(scope = %scope, "ignoring malformed ledger change from another tab");
            }
        }
    }

    // ----- adapter events -----

    /// Apply one observed child value from a watched node.
    pub fn handle_node_event(&mut self, event: NodeEvent) {
        let Some((scope, collection)) = self.paths.get(&event.path).cloned() else {
            tracing::debug!(path = %event.path, "event for unwatched path dropped");
            return;
        };
        if let Some(record) = event.value.as_record() {
            self.clock.observe(record.updated_at);
        }
        let online = self.connectivity.is_online();
        let vault = Arc::clone(&self.vault);
        let Some(state) = self.scopes.get_mut(&scope) else {
            return;
        };

        let before = state.visible(collection, &event.key);
        // A confirmation (or a tombstone) observed through the subscription
        // settles the queued intent even when its ack never arrives.
        let settled = state.outbox.settle(collection, &event.key, &event.value);
        if settled.is_some() && let Err(err) = state.outbox.persist(vault.as_ref(), self.clock.stamp())
        {
            tracing::warn!(scope = %scope, error = %err, "failed to persist settled queue");
        }
        if let Some(view) = state.views.get_mut(&collection) {
            view.apply_remote(&event.key, &event.value);
            // A stamp tie can settle a superseded slot with its older twin;
            // the settled intent goes on top so the last local write stays
            // rendered. Tombstones are final and are never overlaid.
            if let Some(write) = &settled
                && !event.value.is_absent()
            {
                view.apply_remote(&event.key, &write.value);
            }
        }
        let after = state.visible(collection, &event.key);
        if before != after {
            state.publish(ViewEvent::Slot {
                collection,
                key: event.key.clone(),
                record: after,
            });
        }
        if settled.is_some() {
            state.refresh_status(online);
        }
    }

    /// Apply one write acknowledgement from the adapter.
    pub fn handle_ack(&mut self, ack: WriteAck) {
        let Some((scope, collection)) = self.paths.get(&ack.path).cloned() else {
            tracing::debug!(path = %ack.path, "ack for unwatched path dropped");
            return;
        };
        let advisory_after = self.config.write_reject_advisory;
        let online = self.connectivity.is_online();
        let vault = Arc::clone(&self.vault);
        let wall = self.clock.stamp();
        let Some(state) = self.scopes.get_mut(&scope) else {
            return;
        };

        let before = state.visible(collection, &ack.key);
        match ack.outcome {
            AckOutcome::Committed => {
                let Some(confirmed) = state.outbox.confirm(collection, &ack.key) else {
                    // Late or duplicate ack; the slot already settled.
                    tracing::debug!(key = %ack.key, "ack for already-settled write");
                    return;
                };
                // Fold the acknowledged value into the confirmed cache so
                // the rendered slot cannot regress while the subscription
                // echo is still in flight.
                if let Some(view) = state.views.get_mut(&collection) {
                    view.apply_remote(&ack.key, &confirmed.value);
                }
                if let Err(err) = state.outbox.persist(vault.as_ref(), wall) {
                    tracing::warn!(scope = %scope, error = %err, "failed to persist confirmed queue");
                }
                tracing::debug!(key = %ack.key, "write confirmed");
                state.refresh_status(online);
            }
            AckOutcome::Rejected { reason } => {
                let Some(rejections) = state.outbox.note_rejection(collection, &ack.key) else {
                    tracing::debug!(key = %ack.key, "rejection for already-settled write");
                    return;
                };
                if let Err(err) = state.outbox.persist(vault.as_ref(), wall) {
                    tracing::warn!(scope = %scope, error = %err, "failed to persist rejection count");
                }
                tracing::warn!(key = %ack.key, rejections, reason = %reason, "backend rejected write, keeping it queued");
                if rejections >= advisory_after {
                    state.publish(ViewEvent::WriteAdvisory {
                        collection,
                        key: ack.key.clone(),
                        reason,
                        rejections,
                    });
                }
            }
        }
        let after = state.visible(collection, &ack.key);
        if before != after {
            state.publish(ViewEvent::Slot {
                collection,
                key: ack.key.clone(),
                record: after,
            });
        }
    }

    /// Apply a connectivity transition reported by the adapter.
    pub fn handle_connectivity(&mut self, connectivity: Connectivity) {
        if connectivity == self.connectivity {
            return;
        }
        self.connectivity = connectivity;
        tracing::info!(%connectivity, "backend connectivity changed");
        self.refresh_all_statuses();
        if connectivity.is_online() {
            self.ensure_watches();
            self.flush_all();
        }
    }

    /// Periodic driver: reconnect while down, replay the queues while up.
    pub fn tick(&mut self) {
        if self.connectivity.is_online() {
            self.flush_all();
            return;
        }
        match self.store.reconnect() {
            Ok(true) => self.handle_connectivity(Connectivity::Online),
            Ok(false) => tracing::debug!("reconnect attempt failed, backend still offline"),
            Err(err) => tracing::debug!(error = %err, "reconnect attempt errored"),
        }
    }

    // ----- flushing -----

    /// Replay pending writes for every open scope.
    pub fn flush_all(&mut self) {
        let scopes: Vec<ScopeId> = self.scopes.keys().cloned().collect();
        for scope in scopes {
            self.flush_scope(&scope);
        }
    }

    /// Replay this scope's pending writes, oldest first.
    ///
    /// Entries stay queued until confirmed, so calling this repeatedly
    /// issues at most one write per still-pending slot per call.
    pub fn flush_scope(&mut self, scope: &ScopeId) {
        if !self.connectivity.is_online() {
            return;
        }
        let batch_max = self.config.limits.flush_batch_max_writes;
        let store = Arc::clone(&self.store);
        let vault = Arc::clone(&self.vault);
        let acks = self.acks.clone();
        let Some(state) = self.scopes.get_mut(scope) else {
            return;
        };
        if state.outbox.is_empty() {
            return;
        }
        let batch = state.outbox.flush_batch(batch_max);
        if let Err(err) = state.outbox.persist(vault.as_ref(), self.clock.stamp()) {
            tracing::warn!(scope = %scope, error = %err, "failed to persist attempt counters");
        }
        let partition = state.partition.clone();
        tracing::debug!(scope = %scope, writes = batch.len(), "flushing pending queue");

        for write in batch {
            let path = partition.collection(write.collection);
            if let Err(err) = store.write(&path, &write.key, write.value, acks.clone()) {
                match err {
                    StoreError::Offline => {
                        self.note_offline();
                        return;
                    }
                    other => {
                        tracing::warn!(key = %write.key, error = %other, "flush write failed, keeping queued");
                    }
                }
            }
        }
    }

    fn note_offline(&mut self) {
        if self.connectivity == Connectivity::Offline {
            return;
        }
        self.connectivity = Connectivity::Offline;
        tracing::info!("backend unreachable, holding writes locally");
        self.refresh_all_statuses();
    }

    fn refresh_all_statuses(&mut self) {
        let online = self.connectivity.is_online();
        for state in self.scopes.values_mut() {
            state.refresh_status(online);
        }
    }

    /// Reattach any watch lost while offline. Attach is idempotent per
    /// path, so already-live watches are untouched.
    fn ensure_watches(&mut self) {
        for path in self.paths.keys() {
            if !self.mux.attached(path)
                && let Err(err) = self.mux.attach(path, self.node_events.clone())
            {
                tracing::warn!(path = %path, error = %err, "watch reattach failed");
            }
        }
    }
}

fn parse_ledger_entry(raw: &str) -> Option<u64> {
    let entry: VaultEntry = serde_json::from_str(raw).ok()?;
    entry.check_version().ok()?;
    serde_json::from_value(entry.payload).ok()
}
