//! Scope selection: mapping a space selector plus authentication state to a
//! concrete storage partition.
//!
//! `resolve` is pure and total. Side effects that feed it (minting a guest
//! id, reading the vault) happen in the caller before invocation, so the
//! mapping itself is trivially table-testable.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::identity::{GuestId, SpaceName, UserId};
use super::record::Collection;

/// Which space the caller wants to work in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Space {
    /// The caller's own data: authenticated partition or local guest.
    Personal,
    /// The fixed organization-wide shared space.
    Organization,
    /// The fixed public shared space.
    Public,
    /// An arbitrary named shared space.
    Named(SpaceName),
}

/// Authentication state as supplied by the auth provider collaborator.
///
/// `session_active` distinguishes a fully established session from a
/// mid-recall one (credentials known, session not yet usable for writes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthSnapshot {
    Authenticated {
        user: UserId,
        session_active: bool,
        display_name: Option<String>,
    },
    Guest {
        guest: GuestId,
    },
    Anonymous,
}

/// Concrete address of a scope's data in the remote store.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionPath(String);

impl PartitionPath {
    pub fn user(user: &UserId) -> Self {
        Self(format!("users/{user}"))
    }

    pub fn guest(guest: &GuestId) -> Self {
        Self(format!("guests/{guest}"))
    }

    pub fn shared(name: &str) -> Self {
        Self(format!("spaces/{name}"))
    }

    /// Node path of one collection under this partition.
    pub fn collection(&self, collection: Collection) -> NodePath {
        NodePath(format!("{}/{}", self.0, collection.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PartitionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionPath({:?})", self.0)
    }
}

impl fmt::Display for PartitionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of one collection node in the remote store.
///
/// Children of this node are the collection's records, keyed by RecordKey.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(String);

impl NodePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({:?})", self.0)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable key for an open scope, derived from its partition.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn from_partition(partition: &PartitionPath) -> Self {
        Self(partition.as_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({:?})", self.0)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of scope resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeResolution {
    /// Where the scope's data lives; `None` means no partition is usable yet.
    pub partition: Option<PartitionPath>,
    /// Writes must be refused locally until a session exists.
    pub requires_auth: bool,
    /// Any stale "please sign in" affordance should be cleared.
    pub clear_stale_auth_ui: bool,
}

impl ScopeResolution {
    fn unresolved(requires_auth: bool) -> Self {
        Self {
            partition: None,
            requires_auth,
            clear_stale_auth_ui: false,
        }
    }

    fn resolved(partition: PartitionPath) -> Self {
        Self {
            partition: Some(partition),
            requires_auth: false,
            clear_stale_auth_ui: false,
        }
    }
}

/// Map a space selector and auth state to a partition.
///
/// Total and side-effect-free. Shared spaces always resolve; authorization
/// for them, if any, is a collaborator concern. A personal space resolves
/// only when a usable identity exists: an active session or a guest id.
pub fn resolve(space: &Space, auth: &AuthSnapshot) -> ScopeResolution {
    match space {
        Space::Personal => match auth {
            AuthSnapshot::Authenticated {
                user,
                session_active: true,
                ..
            } => ScopeResolution {
                partition: Some(PartitionPath::user(user)),
                requires_auth: false,
                clear_stale_auth_ui: true,
            },
            AuthSnapshot::Authenticated {
                session_active: false,
                ..
            } => ScopeResolution::unresolved(true),
            AuthSnapshot::Guest { guest } => {
                ScopeResolution::resolved(PartitionPath::guest(guest))
            }
            AuthSnapshot::Anonymous => ScopeResolution::unresolved(false),
        },
        Space::Organization => ScopeResolution::resolved(PartitionPath::shared("organization")),
        Space::Public => ScopeResolution::resolved(PartitionPath::shared("public")),
        Space::Named(name) => ScopeResolution::resolved(PartitionPath::shared(name.as_str())),
    }
}
