//! Safety limits for queues, payloads, and fan-out (normative defaults).

use serde::{Deserialize, Serialize};

use crate::core::record::RecordBody;
use crate::core::{InvalidRecord, RecordKey};

/// Caps that keep one misbehaving caller from sinking the whole layer.
///
/// Values are intentionally explicit about their units to avoid confusion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncLimits {
    pub max_record_bytes: usize,
    pub max_note_bytes: usize,
    pub max_title_bytes: usize,
    pub max_category_bytes: usize,

    pub max_pending_writes_per_scope: usize,
    pub max_outbox_bytes: usize,
    pub flush_batch_max_writes: usize,

    pub max_view_subscribers: usize,
    pub max_value_subscribers: usize,
    pub subscriber_queue_events: usize,
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            max_record_bytes: 256 * 1024,
            max_note_bytes: 64 * 1024,
            max_title_bytes: 4 * 1024,
            max_category_bytes: 256,

            max_pending_writes_per_scope: 10_000,
            max_outbox_bytes: 16 * 1024 * 1024,
            flush_batch_max_writes: 512,

            max_view_subscribers: 256,
            max_value_subscribers: 256,
            subscriber_queue_events: 1024,
        }
    }
}

impl SyncLimits {
    /// Field-level validation of a record body before it is accepted.
    pub fn check_body(&self, key: &RecordKey, body: &RecordBody) -> Result<(), InvalidRecord> {
        let too_long = |field: &str, len: usize, cap: usize| InvalidRecord {
            key: key.as_str().to_string(),
            reason: format!("{field} is {len} bytes, cap is {cap}"),
        };
        match body {
            RecordBody::Expense {
                category, note, ..
            } => {
                if category.len() > self.max_category_bytes {
                    return Err(too_long("category", category.len(), self.max_category_bytes));
                }
                if let Some(note) = note
                    && note.len() > self.max_note_bytes
                {
                    return Err(too_long("note", note.len(), self.max_note_bytes));
                }
            }
            RecordBody::Goal { title, .. } | RecordBody::Outcome { title, .. } => {
                if title.len() > self.max_title_bytes {
                    return Err(too_long("title", title.len(), self.max_title_bytes));
                }
            }
        }
        Ok(())
    }
}
