//! Typed records, collections, and the deletion sentinel.
//!
//! Record shapes are a tagged union per collection rather than free-form
//! maps, so a drifted field set is a decode error instead of a silent
//! runtime surprise. Wire field names stay camelCase to match what the
//! remote store's other clients write.

use serde::{Deserialize, Serialize};

use super::time::Millis;

/// A collection of records under one partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Expenses,
    Goals,
    Outcomes,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Expenses, Collection::Goals, Collection::Outcomes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Expenses => "expenses",
            Collection::Goals => "goals",
            Collection::Outcomes => "outcomes",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record body, one variant per collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordBody {
    #[serde(rename_all = "camelCase")]
    Expense {
        category: String,
        amount: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Goal {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<f64>,
        #[serde(default)]
        completed: bool,
    },
    #[serde(rename_all = "camelCase")]
    Outcome {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
    },
}

impl RecordBody {
    /// The collection this body belongs to.
    pub fn collection(&self) -> Collection {
        match self {
            RecordBody::Expense { .. } => Collection::Expenses,
            RecordBody::Goal { .. } => Collection::Goals,
            RecordBody::Outcome { .. } => Collection::Outcomes,
        }
    }
}

/// A full record: typed body plus application timestamps.
///
/// `updated_at` drives latest-wins merging; `created_at` is display-only.
/// Rewrites replace the whole record (no field patching).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(flatten)]
    pub body: RecordBody,
    pub created_at: Millis,
    pub updated_at: Millis,
}

impl Record {
    /// New record stamped at `now`.
    pub fn new(body: RecordBody, now: Millis) -> Self {
        Self {
            body,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn collection(&self) -> Collection {
        self.body.collection()
    }

    /// Re-stamp for an optimistic rewrite, preserving creation time.
    ///
    /// A zero `created_at` (caller-constructed record) is backfilled so the
    /// invariant `created_at <= updated_at` holds for display ordering.
    pub fn stamp_update(&mut self, now: Millis) {
        self.updated_at = now;
        if self.created_at.get() == 0 {
            self.created_at = now;
        }
    }

    /// Serialized size in bytes, used against `SyncLimits::max_record_bytes`.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// What lives at a node: a record, or the explicit "absent" sentinel.
///
/// `Absent` is a tombstone written on delete, distinct from a key that never
/// existed. On the wire and in the vault it serializes as `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<Record>", into = "Option<Record>")]
pub enum NodeValue {
    Record(Record),
    Absent,
}

impl NodeValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, NodeValue::Absent)
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            NodeValue::Record(record) => Some(record),
            NodeValue::Absent => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            NodeValue::Record(record) => Some(record),
            NodeValue::Absent => None,
        }
    }
}

impl From<Option<Record>> for NodeValue {
    fn from(value: Option<Record>) -> Self {
        match value {
            Some(record) => NodeValue::Record(record),
            None => NodeValue::Absent,
        }
    }
}

impl From<NodeValue> for Option<Record> {
    fn from(value: NodeValue) -> Self {
        match value {
            NodeValue::Record(record) => Some(record),
            NodeValue::Absent => None,
        }
    }
}
