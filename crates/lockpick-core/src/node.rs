//! Contender nodes and the handle of a held lock

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{mode::NodeKind, path::LockPath, CoordinationClient, LockMode, Result};

/// Sequence number encoded in a node name's trailing digit run
#[must_use]
pub fn sequence_of(name: &str) -> Option<u64> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// One participant waiting for or holding a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contender {
    /// Identity stored as the node payload (empty when none was given)
    pub identity: String,
    /// Full path of the node
    pub path: String,
}

impl Contender {
    /// Node name (last path segment)
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Sequence number assigned by the coordination service
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        sequence_of(self.name())
    }

    /// Read or write kind, when the name carries a known marker
    #[must_use]
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::of(self.name())
    }
}

impl std::fmt::Display for Contender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' {}", self.identity, self.path)
    }
}

/// A lock confirmed as held.
///
/// The handle owns the created node. Consuming it with [`LockHandle::release`]
/// deletes the node; [`LockHandle::into_node_path`] hands ownership over to a
/// later `unlock` instead.
#[derive(Debug)]
#[must_use = "dropping a LockHandle leaves the lock node in place"]
pub struct LockHandle {
    lock_path: LockPath,
    node_name: String,
    mode: LockMode,
    identity: Option<String>,
    acquired_at: DateTime<Utc>,
}

impl LockHandle {
    pub(crate) fn new(
        lock_path: LockPath,
        node_name: String,
        mode: LockMode,
        identity: Option<String>,
    ) -> Self {
        Self {
            lock_path,
            node_name,
            mode,
            identity,
            acquired_at: Utc::now(),
        }
    }

    /// Logical lock this handle belongs to
    pub const fn lock_path(&self) -> &LockPath {
        &self.lock_path
    }

    /// Name of the held node
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Full path of the held node
    #[must_use]
    pub fn node_path(&self) -> String {
        self.lock_path.child(&self.node_name)
    }

    /// Mode the lock was taken in
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    /// Identity stored in the node
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// When the lock became held
    #[must_use]
    pub const fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Give up ownership, returning the node path for a later release
    #[must_use]
    pub fn into_node_path(self) -> String {
        self.node_path()
    }

    /// Release the lock by deleting its node
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the node already disappeared (session expiry or a
    /// foreign delete), or a coordination error.
    pub async fn release<C>(self, client: &C) -> Result<()>
    where
        C: CoordinationClient + ?Sized,
    {
        crate::release::release_node(client, &self.node_path(), self.identity.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_of() {
        assert_eq!(sequence_of("9d2badee__rlock__0000000022"), Some(22));
        assert_eq!(sequence_of("abc__lock__0000000000"), Some(0));
        assert_eq!(sequence_of("no-digits"), None);
    }

    #[test]
    fn test_contender_display_and_name() {
        let contender = Contender {
            identity: "worker-1".to_string(),
            path: "/jobs/nightly/ab__lock__0000000007".to_string(),
        };
        assert_eq!(
            contender.to_string(),
            "'worker-1' /jobs/nightly/ab__lock__0000000007"
        );
        assert_eq!(contender.name(), "ab__lock__0000000007");
        assert_eq!(contender.sequence(), Some(7));
        assert_eq!(contender.kind(), Some(NodeKind::Write));
    }
}
