//! The coordination service seen from the lock protocol.
//!
//! Implementations wrap a ZooKeeper-style store: sequential child creation,
//! children listing, payload reads, deletes that fail distinctly with
//! [`Error::NotFound`](crate::Error::NotFound), and a watch on node removal.
//! One client is one session; it is shared through an `Arc` between the
//! controlling flow and its acquisition worker and must serialize its own I/O.

use async_trait::async_trait;

use crate::Result;

/// Hierarchical node store with ordered sequential children
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Open the session. Calling it on a started client is a no-op.
    async fn start(&self) -> Result<()>;

    /// Close the session. Calling it on a stopped client is a no-op.
    async fn stop(&self) -> Result<()>;

    /// Create `path` and any missing ancestors with empty payloads
    async fn ensure_path(&self, path: &str) -> Result<()>;

    /// Atomically create a child of `parent` named `prefix` followed by a
    /// zero-padded sequence number, returning the new node's name.
    async fn create_sequential(
        &self,
        parent: &str,
        prefix: &str,
        payload: &[u8],
        ephemeral: bool,
    ) -> Result<String>;

    /// Names of the children of `path`, in the service's enumeration order
    async fn get_children(&self, path: &str) -> Result<Vec<String>>;

    /// Payload stored at `path`
    async fn get_data(&self, path: &str) -> Result<Vec<u8>>;

    /// Whether `path` exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Delete `path`, failing with `NotFound` when it is absent
    async fn delete(&self, path: &str) -> Result<()>;

    /// Resolve once `path` no longer exists (immediately if already absent)
    async fn wait_deleted(&self, path: &str) -> Result<()>;
}
