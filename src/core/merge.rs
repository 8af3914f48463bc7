//! Convergence rules for one record slot.
//!
//! Records carry their own `updatedAt` stamp; a cache keeps whichever side
//! is fresher, and equal stamps go to the arriving side so every replica
//! lands on the same answer regardless of delivery order. Deletions carry
//! no stamp of their own and always win over the cached record; a record
//! observed after a deletion re-fills the slot.

use super::record::{NodeValue, Record};

/// What `merge` decided to keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    KeptCurrent,
    TookIncoming,
}

/// Merge an incoming remote value against the cached record for a slot.
///
/// `None` for `current` means the slot holds nothing (never seen, or
/// deleted); any incoming value lands then.
pub fn merge(current: Option<&Record>, incoming: &NodeValue) -> MergeOutcome {
    match (current, incoming) {
        (Some(cur), NodeValue::Record(inc)) => {
            if inc.updated_at >= cur.updated_at {
                MergeOutcome::TookIncoming
            } else {
                MergeOutcome::KeptCurrent
            }
        }
        // Tombstones apply regardless of the cached stamp.
        (_, NodeValue::Absent) => MergeOutcome::TookIncoming,
        (None, NodeValue::Record(_)) => MergeOutcome::TookIncoming,
    }
}

/// Does an observed remote value settle a pending local write?
///
/// A pending record write settles once the remote slot carries a record at
/// or past its stamp, or when the slot reads as deleted: a tombstone wins
/// over any optimistic record, so there is nothing left to replay. A
/// pending deletion settles only when the remote slot reads as deleted;
/// a record observed meanwhile means the delete has not landed yet.
pub fn settles_pending(pending: &NodeValue, observed: &NodeValue) -> bool {
    match (pending, observed) {
        (NodeValue::Record(p), NodeValue::Record(o)) => o.updated_at >= p.updated_at,
        (_, NodeValue::Absent) => true,
        (NodeValue::Absent, NodeValue::Record(_)) => false,
    }
}
