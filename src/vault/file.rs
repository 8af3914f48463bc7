//! On-disk vault backed by one JSON file per key.
//!
//! Entries are written atomically via temp file + fsync + rename, so a
//! crash mid-write leaves the previous entry intact. Keys are hashed into
//! filenames, which keeps partition paths with `/` in them out of the
//! directory layout.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{Vault, VaultEntry, VaultError};

pub struct FileVault {
    dir: PathBuf,
}

impl FileVault {
    /// Open a vault rooted at `root`, creating the directory if needed.
    ///
    /// Stale temp files from an interrupted write are swept on open.
    pub fn open(root: &Path) -> Result<Self, VaultError> {
        fs::create_dir_all(root)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(root, fs::Permissions::from_mode(0o700));
        }

        let vault = FileVault {
            dir: root.to_path_buf(),
        };
        vault.cleanup_stale()?;
        Ok(vault)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = hasher.finalize();
        // 16 hex chars of the key hash name the file.
        let hash_hex = hex::encode(&hash[..8]);
        self.dir.join(format!("{}.json", hash_hex))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        self.entry_path(key).with_extension("json.tmp")
    }

    fn cleanup_stale(&self) -> Result<(), VaultError> {
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "tmp") {
                    let _ = fs::remove_file(&path);
                }
            }
        }
        Ok(())
    }
}

impl Vault for FileVault {
    /// Write an entry atomically.
    ///
    /// Uses write-to-temp + fsync + rename for crash safety.
    fn put(&self, key: &str, entry: &VaultEntry) -> Result<(), VaultError> {
        let tmp_path = self.tmp_path(key);
        let entry_path = self.entry_path(key);

        let data = serde_json::to_vec(entry)?;

        let mut file = File::create(&tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;

        fs::rename(&tmp_path, &entry_path)?;

        // The rename is only durable once the directory entry is synced.
        #[cfg(unix)]
        {
            if let Ok(dir) = File::open(&self.dir) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<VaultEntry>, VaultError> {
        let entry_path = self.entry_path(key);

        if !entry_path.exists() {
            return Ok(None);
        }

        let data = fs::read(&entry_path)?;
        let entry: VaultEntry = serde_json::from_slice(&data)?;
        entry.check_version()?;

        Ok(Some(entry))
    }

    fn remove(&self, key: &str) -> Result<(), VaultError> {
        // Remove both the entry and any stale temp file
        let _ = fs::remove_file(self.entry_path(key));
        let _ = fs::remove_file(self.tmp_path(key));
        Ok(())
    }
}
