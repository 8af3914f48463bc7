//! Null backend for devices with no remote configured.
//!
//! Every operation reports offline. Writes therefore stay queued in the
//! outbox indefinitely and the engine serves purely local state, which is
//! exactly the degraded mode the layer promises when no backend exists.

use crossbeam::channel::Sender;

use crate::core::record::NodeValue;
use crate::core::scope::NodePath;
use crate::core::RecordKey;

use super::{Connectivity, NodeEvent, NodeStore, NodeWatch, StoreError, WriteAck};

#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineStore;

impl OfflineStore {
    pub fn new() -> Self {
        Self
    }
}

struct InertWatch {
    path: NodePath,
}

impl NodeWatch for InertWatch {
    fn path(&self) -> &NodePath {
        &self.path
    }
}

impl NodeStore for OfflineStore {
    fn write(
        &self,
        _path: &NodePath,
        _key: &RecordKey,
        _value: NodeValue,
        _acks: Sender<WriteAck>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Offline)
    }

    fn read_once(&self, _path: &NodePath, _key: &RecordKey) -> Result<NodeValue, StoreError> {
        Err(StoreError::Offline)
    }

    fn subscribe(
        &self,
        path: &NodePath,
        _events: Sender<NodeEvent>,
    ) -> Result<Box<dyn NodeWatch>, StoreError> {
        // Accepted but never fires; the caller keeps its local view.
        Ok(Box::new(InertWatch { path: path.clone() }))
    }

    fn watch_connectivity(&self, tx: Sender<Connectivity>) -> Result<(), StoreError> {
        let _ = tx.send(Connectivity::Offline);
        Ok(())
    }

    fn online(&self) -> bool {
        false
    }

    fn reconnect(&self) -> Result<bool, StoreError> {
        Ok(false)
    }
}
