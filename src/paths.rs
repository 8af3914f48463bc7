//! XDG directory helpers for config/data locations.

use std::path::PathBuf;

/// Base directory for persistent data (vault files).
///
/// Uses `TETHER_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/tether` or
/// `~/.local/share/tether`.
pub(crate) fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TETHER_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("tether")
}

/// Default root for the on-disk vault.
pub fn vault_dir() -> PathBuf {
    data_dir().join("vault")
}

/// Base directory for configuration files.
///
/// Uses `TETHER_CONFIG_DIR` if set, otherwise `$XDG_CONFIG_HOME/tether` or
/// `~/.config/tether`.
pub(crate) fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TETHER_CONFIG_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join("tether")
}

/// Path of the layer's config file (config.toml).
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
