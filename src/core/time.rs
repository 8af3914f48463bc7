//! Wall-clock milliseconds and the stamping clock.
//!
//! Records are ordered by `updated_at` milliseconds; ties fall to arrival
//! order at the merge site, so no logical counter is kept here.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
///
/// Used for `created_at`/`updated_at` stamps and latest-wins comparison.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Millis(pub u64);

impl Millis {
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

/// Stamping clock for optimistic writes.
///
/// Never moves backward, even when the wall clock does: a stamp handed out
/// here is always >= every earlier stamp from the same clock. Equal stamps
/// are possible within one millisecond; the merge policy resolves those by
/// arrival order.
#[derive(Debug)]
pub struct Clock {
    last_ms: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            last_ms: Millis::now().get(),
        }
    }

    /// Produce a stamp for a write issued now.
    pub fn stamp(&mut self) -> Millis {
        let now = Millis::now().get();
        if now > self.last_ms {
            self.last_ms = now;
        }
        Millis(self.last_ms)
    }

    /// Fold in a remotely observed stamp so later local stamps never sort
    /// behind state we have already seen.
    pub fn observe(&mut self, remote: Millis) {
        if remote.get() > self.last_ms {
            self.last_ms = remote.get();
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
