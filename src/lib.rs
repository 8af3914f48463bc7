#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod limits;
mod paths;
pub mod remote;
pub mod sync;
pub mod telemetry;
pub mod vault;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the embedder-facing surface at crate root.
pub use crate::config::Config;
pub use crate::core::{
    resolve, AuthSnapshot, Collection, GuestId, Millis, NodePath, NodeValue, PartitionPath,
    Record, RecordBody, RecordKey, ScopeId, ScopeResolution, Space, SpaceName, UserId,
};
pub use crate::limits::SyncLimits;
pub use crate::remote::{
    AckOutcome, Connectivity, MemoryStore, NodeEvent, NodeStore, OfflineStore, WriteAck,
};
pub use crate::sync::{
    DropLimits, Subscription, SwitchOutcome, SyncHandle, SyncRuntime, SyncStatus, ViewEvent,
};
pub use crate::vault::{FileVault, MemoryVault, Vault};
