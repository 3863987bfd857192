//! The blocking acquire primitive.
//!
//! A [`LockDescriptor`] creates one sequential node under the lock path and
//! waits until no earlier node blocks it, watching only the nearest blocking
//! predecessor. The wait ends on eligibility, on the deadline, or when the
//! caller's cancellation token fires; in the last two cases the descriptor
//! removes its own node before returning.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    mode::NodeKind,
    node::{sequence_of, LockHandle},
    CoordinationClient, Error, LockMode, LockPath, Result,
};

/// Read-only view of the node a descriptor has created, if any
#[derive(Debug, Clone)]
pub struct PendingNode {
    lock_path: LockPath,
    node: watch::Receiver<Option<String>>,
}

impl PendingNode {
    /// Full path of the created node, once it exists
    #[must_use]
    pub fn path(&self) -> Option<String> {
        self.node
            .borrow()
            .as_deref()
            .map(|name| self.lock_path.child(name))
    }
}

/// One lock attempt: where, how, and as whom
#[derive(Debug, Clone)]
pub struct LockDescriptor {
    lock_path: LockPath,
    mode: LockMode,
    identity: Option<String>,
    prefix: String,
    ephemeral: bool,
    node: Arc<watch::Sender<Option<String>>>,
}

impl LockDescriptor {
    /// Describe a persistent lock node of `mode` under `lock_path`
    #[must_use]
    pub fn new(lock_path: LockPath, mode: LockMode, identity: Option<String>) -> Self {
        let prefix = format!("{}{}", uuid::Uuid::new_v4().simple(), mode.marker());
        let (node, _) = watch::channel(None);
        Self {
            lock_path,
            mode,
            identity: identity.filter(|id| !id.is_empty()),
            prefix,
            ephemeral: false,
            node: Arc::new(node),
        }
    }

    /// Tie the node to the session instead of leaving it after exit
    #[must_use]
    pub const fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Lock path this descriptor contends on
    #[must_use]
    pub const fn lock_path(&self) -> &LockPath {
        &self.lock_path
    }

    /// Requested mode
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    /// Watchable slot holding the created node's name
    #[must_use]
    pub fn pending(&self) -> PendingNode {
        PendingNode {
            lock_path: self.lock_path.clone(),
            node: self.node.subscribe(),
        }
    }

    /// Create the contender node and block until it holds the lock.
    ///
    /// # Errors
    ///
    /// - `AcquisitionTimeout` when `timeout` elapses first
    /// - `Cancelled` when `cancel` fires first
    /// - `NotFound` when the created node disappears while waiting
    /// - coordination errors from the client
    pub async fn acquire<C>(
        &self,
        client: &C,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<LockHandle>
    where
        C: CoordinationClient + ?Sized,
    {
        let deadline = Instant::now().checked_add(timeout);
        let parent = self.lock_path.as_str();
        let payload = self.identity.as_deref().unwrap_or_default().as_bytes();

        client.ensure_path(parent).await?;
        let name = client
            .create_sequential(parent, &self.prefix, payload, self.ephemeral)
            .await?;
        self.node.send_replace(Some(name.clone()));
        tracing::debug!("Created lock node {}", self.lock_path.child(&name));

        match self
            .wait_until_eligible(client, &name, deadline, cancel)
            .await
        {
            Ok(()) => Ok(LockHandle::new(
                self.lock_path.clone(),
                name,
                self.mode,
                self.identity.clone(),
            )),
            Err(err) => {
                self.remove_node(client, &name).await;
                Err(err)
            }
        }
    }

    async fn wait_until_eligible<C>(
        &self,
        client: &C,
        name: &str,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        C: CoordinationClient + ?Sized,
    {
        loop {
            let children = client.get_children(self.lock_path.as_str()).await?;
            let Some(predecessor) = self.blocking_predecessor(name, &children)? else {
                return Ok(());
            };

            let predecessor_path = self.lock_path.child(&predecessor);
            tracing::debug!("Waiting on {predecessor_path}");

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(Error::Cancelled(self.lock_path.to_string()));
                }
                () = expire(deadline) => {
                    return Err(Error::AcquisitionTimeout(self.lock_path.to_string()));
                }
                deleted = client.wait_deleted(&predecessor_path) => deleted?,
            }
        }
    }

    /// Nearest earlier node that keeps `name` from holding, if any
    fn blocking_predecessor(&self, name: &str, children: &[String]) -> Result<Option<String>> {
        if !children.iter().any(|child| child == name) {
            return Err(Error::NotFound(self.lock_path.child(name)));
        }
        let own = sequence_of(name)
            .ok_or_else(|| Error::invalid_path(name, "lock node has no sequence number"))?;

        Ok(children
            .iter()
            .filter_map(|child| {
                let kind = NodeKind::of(child)?;
                let sequence = sequence_of(child)?;
                (sequence < own && self.mode.is_blocked_by(kind)).then_some((sequence, child))
            })
            .max_by_key(|(sequence, _)| *sequence)
            .map(|(_, child)| child.clone()))
    }

    async fn remove_node<C>(&self, client: &C, name: &str)
    where
        C: CoordinationClient + ?Sized,
    {
        let path = self.lock_path.child(name);
        match client.delete(&path).await {
            Ok(()) => tracing::debug!("Removed abandoned lock node {path}"),
            Err(Error::NotFound(_)) => tracing::debug!("Lock node {path} already gone"),
            Err(err) => tracing::warn!("Couldn't cleanup lock node {path}: {err}"),
        }
        self.node.send_replace(None);
    }
}

/// Resolve at `deadline`; never when the deadline is past `Instant`'s range
async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
