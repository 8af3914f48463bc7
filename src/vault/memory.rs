//! In-memory vault for tests and ephemeral sessions.
//!
//! Clones share the same map, so handing a clone to a rebuilt engine
//! behaves like reopening the same on-disk vault after a restart.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Vault, VaultEntry, VaultError};

#[derive(Clone, Default)]
pub struct MemoryVault {
    inner: Arc<Mutex<BTreeMap<String, VaultEntry>>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, VaultEntry>>, VaultError> {
        self.inner.lock().map_err(|_| VaultError::LockPoisoned)
    }

    /// Keys currently stored, in sorted order.
    pub fn keys(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

impl Vault for MemoryVault {
    fn put(&self, key: &str, entry: &VaultEntry) -> Result<(), VaultError> {
        self.lock()?.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<VaultEntry>, VaultError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), VaultError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_contents() {
        let vault = MemoryVault::new();
        let other = vault.clone();

        vault
            .put("k", &VaultEntry::new(json!(1), 10))
            .unwrap();

        assert_eq!(other.get("k").unwrap().unwrap().payload, json!(1));
        other.remove("k").unwrap();
        assert!(vault.get("k").unwrap().is_none());
    }

    #[test]
    fn keys_are_sorted() {
        let vault = MemoryVault::new();
        vault.put("b", &VaultEntry::new(json!(2), 0)).unwrap();
        vault.put("a", &VaultEntry::new(json!(1), 0)).unwrap();
        assert_eq!(vault.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}
