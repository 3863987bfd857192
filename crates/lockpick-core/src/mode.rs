//! Lock modes and the eligibility discipline between them

use serde::{Deserialize, Serialize};

use crate::Error;

/// Marker embedded in node names created by exclusive and write locks
pub const LOCK_MARKER: &str = "__lock__";

/// Marker embedded in node names created by read locks
pub const READ_MARKER: &str = "__rlock__";

/// Kind of lock requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Plain mutex (`lock`)
    Exclusive,
    /// Shared read lock (`rlock`)
    ReadShared,
    /// Exclusive write lock (`wlock`)
    WriteExclusive,
}

/// Kind of contender node, derived from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Created by a read lock
    Read,
    /// Created by a mutex or write lock
    Write,
}

impl NodeKind {
    /// Classify a node name by its marker
    #[must_use]
    pub fn of(name: &str) -> Option<Self> {
        if name.contains(READ_MARKER) {
            Some(Self::Read)
        } else if name.contains(LOCK_MARKER) {
            Some(Self::Write)
        } else {
            None
        }
    }
}

impl LockMode {
    /// Command word selecting this mode
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::Exclusive => "lock",
            Self::ReadShared => "rlock",
            Self::WriteExclusive => "wlock",
        }
    }

    /// Marker written into node names of this mode
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Exclusive | Self::WriteExclusive => LOCK_MARKER,
            Self::ReadShared => READ_MARKER,
        }
    }

    /// Whether an earlier node of `kind` keeps a node of this mode waiting.
    ///
    /// Readers only wait on writers; mutex and write locks wait on everyone.
    #[must_use]
    pub const fn is_blocked_by(self, kind: NodeKind) -> bool {
        match self {
            Self::ReadShared => matches!(kind, NodeKind::Write),
            Self::Exclusive | Self::WriteExclusive => true,
        }
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.action())
    }
}

impl std::str::FromStr for LockMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lock" => Ok(Self::Exclusive),
            "rlock" => Ok(Self::ReadShared),
            "wlock" => Ok(Self::WriteExclusive),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }
}
