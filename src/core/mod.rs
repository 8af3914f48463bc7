//! Layer 1: pure domain types and rules.
//!
//! Nothing in this layer touches the filesystem, the network, or a clock
//! source other than the injected [`time::Clock`]. Everything here is
//! deterministic and directly unit-testable.

pub mod error;
pub mod identity;
pub mod merge;
pub mod record;
pub mod scope;
pub mod time;

pub use error::{CoreError, InvalidId, InvalidRecord};
pub use identity::{GuestId, RecordKey, SpaceName, UserId};
pub use merge::{merge, settles_pending, MergeOutcome};
pub use record::{Collection, NodeValue, Record, RecordBody};
pub use scope::{
    resolve, AuthSnapshot, NodePath, PartitionPath, ScopeId, ScopeResolution, Space,
};
pub use time::{Clock, Millis};
