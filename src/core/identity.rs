//! Identity atoms.
//!
//! RecordKey: opaque key of a record within a collection
//! UserId / GuestId: who owns a personal partition
//! SpaceName: named shared space selector

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CoreError, InvalidId};

/// Alphabet for generated record keys (lowercase alphanumeric).
const KEY_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque record key, unique within its collection.
///
/// Callers may supply their own keys (non-empty, no `/` so keys never split
/// a node path) or generate one.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId::RecordKey {
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        if s.contains('/') {
            return Err(InvalidId::RecordKey {
                raw: s,
                reason: "contains '/'".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    /// Generate a fresh key with the given suffix length.
    pub fn generate(len: usize) -> Self {
        use rand::Rng;
        assert!(len >= 4, "record key must be >=4 chars");

        let mut rng = rand::rng();
        let suffix: String = (0..len)
            .map(|_| {
                let idx = rng.random_range(0..KEY_ALPHABET.len());
                KEY_ALPHABET[idx] as char
            })
            .collect();
        Self(suffix)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({:?})", self.0)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated user identifier, as handed over by the auth provider.
///
/// Opaque to this crate beyond being non-empty and path-safe.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId::User {
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        if s.contains('/') {
            return Err(InvalidId::User {
                raw: s,
                reason: "contains '/'".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({:?})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locally generated guest identifier.
///
/// Created once per installation and persisted in the vault until a user
/// authenticates; uuid-backed so two installations never collide.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestId(Uuid);

impl GuestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(s).map(Self).map_err(|e| {
            InvalidId::Guest {
                raw: s.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestId({})", self.0)
    }
}

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a shared space (organization, public, or arbitrary).
///
/// Lowercased on parse; restricted to alphanumeric plus `-`/`_` so names
/// embed directly into partition paths.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceName(String);

impl SpaceName {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let lowered = s.trim().to_lowercase();
        if lowered.is_empty() {
            return Err(InvalidId::Space {
                raw: s.to_string(),
                reason: "empty".into(),
            }
            .into());
        }
        if !lowered
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(InvalidId::Space {
                raw: s.to_string(),
                reason: "contains characters outside [a-z0-9-_]".into(),
            }
            .into());
        }
        Ok(Self(lowered))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SpaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpaceName({:?})", self.0)
    }
}

impl fmt::Display for SpaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
