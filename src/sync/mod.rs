//! Layer 4: the sync engine and its runtime.
//!
//! Everything above the ports lives here: the durable pending-write queue,
//! the rendered per-collection views, the counter ledger, subscriber
//! fan-out, and the [`Engine`] that ties them together. [`SyncRuntime`]
//! puts the engine on its own thread behind a [`SyncHandle`].

pub mod broadcast;
pub mod engine;
pub mod ledger;
pub mod multiplexer;
pub mod outbox;
pub mod runtime;
pub mod view;

pub use broadcast::{BroadcastError, Broadcaster, DropReason, Subscription};
pub use engine::{Engine, EngineError, SwitchOutcome};
pub use ledger::{DropLimits, Ledger};
pub use multiplexer::Multiplexer;
pub use outbox::{Outbox, PendingWrite};
pub use runtime::{Command, SyncHandle, SyncRuntime};
pub use view::{CollectionView, SyncStatus, ViewEvent};
