//! Layer 3: the remote node store port.
//!
//! The sync engine talks to the replicated backend exclusively through
//! [`NodeStore`]. Backends are injected at construction, so tests drive the
//! engine with [`MemoryStore`] and a device with no configured backend runs
//! against [`OfflineStore`] without the engine knowing the difference.

use std::fmt;

use crossbeam::channel::Sender;
use thiserror::Error;

use crate::core::record::NodeValue;
use crate::core::scope::NodePath;
use crate::core::RecordKey;

mod memory;
mod offline;

pub use memory::MemoryStore;
pub use offline::OfflineStore;

/// Reachability of the backend as last observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

/// One observed child value under a subscribed node.
///
/// `Absent` means the child does not exist remotely (it was deleted or
/// never written).
#[derive(Clone, Debug, PartialEq)]
pub struct NodeEvent {
    pub path: NodePath,
    pub key: RecordKey,
    pub value: NodeValue,
}

/// Terminal outcome the backend reported for one write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    Committed,
    Rejected { reason: String },
}

/// Acknowledgement for a previously issued write.
///
/// Correlated by `(path, key)`. Acks may arrive late, out of order, more
/// than once, or never; callers must treat them as best-effort.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteAck {
    pub path: NodePath,
    pub key: RecordKey,
    pub outcome: AckOutcome,
}

/// Live subscription handle. Dropping it cancels delivery.
pub trait NodeWatch: Send {
    fn path(&self) -> &NodePath;
}

/// Store backend failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store is offline")]
    Offline,

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn transience(&self) -> crate::error::Transience {
        use crate::error::Transience;
        match self {
            StoreError::Offline => Transience::Retryable,
            StoreError::Backend(_) => Transience::Unknown,
            StoreError::LockPoisoned => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> crate::error::Effect {
        use crate::error::Effect;
        match self {
            StoreError::Offline => Effect::None,
            StoreError::Backend(_) => Effect::Unknown,
            StoreError::LockPoisoned => Effect::Unknown,
        }
    }
}

/// Port to the replicated node store.
///
/// The store is a tree of nodes addressed by [`NodePath`]; each node holds
/// children keyed by [`RecordKey`]. All delivery is via channels owned by
/// the caller, never via callbacks into foreign threads.
pub trait NodeStore: Send + Sync {
    /// Issue a write for one child. `Absent` deletes the child.
    ///
    /// Returning `Ok` means the write was handed to the backend, not that
    /// it was committed; the outcome, if any, arrives on `acks`.
    fn write(
        &self,
        path: &NodePath,
        key: &RecordKey,
        value: NodeValue,
        acks: Sender<WriteAck>,
    ) -> Result<(), StoreError>;

    /// Read one child value without subscribing.
    fn read_once(&self, path: &NodePath, key: &RecordKey) -> Result<NodeValue, StoreError>;

    /// Subscribe to a node. Fires one event per existing child, then one
    /// per change, until the returned handle is dropped.
    fn subscribe(
        &self,
        path: &NodePath,
        events: Sender<NodeEvent>,
    ) -> Result<Box<dyn NodeWatch>, StoreError>;

    /// Register for connectivity transitions. The current state is sent
    /// immediately, then every change.
    fn watch_connectivity(&self, tx: Sender<Connectivity>) -> Result<(), StoreError>;

    /// Last observed reachability.
    fn online(&self) -> bool;

    /// Attempt to re-establish the backend session.
    ///
    /// Returns whether the store is online afterwards.
    fn reconnect(&self) -> Result<bool, StoreError>;
}
