//! Layer 2: the vault, a small durable key/value store on the local device.
//!
//! The sync layer parks three things here: pending-write queues, ledger
//! values, and the minted guest identity. Entries are JSON envelopes with a
//! format version so a future layout change can be detected instead of
//! silently misread. Writes must be atomic: a crash mid-write may lose the
//! newest entry but never corrupts the previous one.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::time::Millis;

mod file;
mod memory;

pub use file::FileVault;
pub use memory::MemoryVault;

/// Envelope format version.
pub const VAULT_VERSION: u32 = 1;

/// A versioned vault entry wrapping an opaque JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultEntry {
    /// Format version for future compatibility.
    pub version: u32,
    /// Wall clock time when written (for debugging).
    pub written_at_ms: u64,
    /// Caller payload.
    pub payload: serde_json::Value,
}

impl VaultEntry {
    pub fn new(payload: serde_json::Value, wall_ms: u64) -> Self {
        Self {
            version: VAULT_VERSION,
            written_at_ms: wall_ms,
            payload,
        }
    }

    pub(crate) fn check_version(&self) -> Result<(), VaultError> {
        if self.version != VAULT_VERSION {
            return Err(VaultError::VersionMismatch {
                expected: VAULT_VERSION,
                got: self.version,
            });
        }
        Ok(())
    }
}

/// Vault errors.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("vault entry version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("vault lock poisoned")]
    LockPoisoned,
}

impl VaultError {
    pub fn transience(&self) -> crate::error::Transience {
        use crate::error::Transience;
        match self {
            VaultError::Io(_) => Transience::Unknown,
            VaultError::Json(_) => Transience::Permanent,
            VaultError::VersionMismatch { .. } => Transience::Permanent,
            VaultError::LockPoisoned => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> crate::error::Effect {
        use crate::error::Effect;
        match self {
            // Writes go through a temp file; a failure leaves the old entry.
            VaultError::Io(_) => Effect::Unknown,
            VaultError::Json(_) => Effect::None,
            VaultError::VersionMismatch { .. } => Effect::None,
            VaultError::LockPoisoned => Effect::Unknown,
        }
    }
}

/// Durable string-keyed storage for small JSON documents.
///
/// Implementations must make `put` atomic with respect to crashes and must
/// return exactly what was last stored for a key, or `None`.
pub trait Vault: Send + Sync {
    fn put(&self, key: &str, entry: &VaultEntry) -> Result<(), VaultError>;
    fn get(&self, key: &str) -> Result<Option<VaultEntry>, VaultError>;
    fn remove(&self, key: &str) -> Result<(), VaultError>;
}

/// Store a serializable value under `key`.
pub fn put_json<T: Serialize>(
    vault: &dyn Vault,
    key: &str,
    value: &T,
    wall: Millis,
) -> Result<(), VaultError> {
    let payload = serde_json::to_value(value)?;
    vault.put(key, &VaultEntry::new(payload, wall.get()))
}

/// Load a value stored with [`put_json`]; `None` when the key is absent.
pub fn get_json<T: DeserializeOwned>(vault: &dyn Vault, key: &str) -> Result<Option<T>, VaultError> {
    match vault.get(key)? {
        Some(entry) => Ok(Some(serde_json::from_value(entry.payload)?)),
        None => Ok(None),
    }
}
