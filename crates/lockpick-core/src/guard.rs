//! Interrupt-time cleanup of in-flight lock nodes.
//!
//! The guard holds a single slot for the acquisition currently in flight. An
//! acquisition arms the slot when it starts and disarms it when it ends; an
//! interrupt takes whatever is in the slot, deletes its node and closes the
//! session. Taking the slot makes the cleanup run at most once.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use crate::{
    acquire::AcquisitionOutcome, recipe::PendingNode, CoordinationClient, Error, Result,
};

/// Default bound on each network call made during cleanup
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Guards acquisitions of one client session against interruption
pub struct CancellationGuard<C: ?Sized> {
    client: Arc<C>,
    current: Mutex<Option<PendingNode>>,
    cleanup_timeout: Duration,
}

/// Keeps the guard armed for one acquisition; disarms on drop
pub struct Armed<'a, C: ?Sized> {
    guard: &'a CancellationGuard<C>,
}

impl<C: ?Sized> Drop for Armed<'_, C> {
    fn drop(&mut self) {
        self.guard.slot().take();
    }
}

impl<C: ?Sized> CancellationGuard<C> {
    fn slot(&self) -> std::sync::MutexGuard<'_, Option<PendingNode>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> CancellationGuard<C>
where
    C: CoordinationClient + ?Sized,
{
    /// Create a guard whose cleanup calls are each bounded by `cleanup_timeout`
    #[must_use]
    pub fn new(client: Arc<C>, cleanup_timeout: Duration) -> Self {
        Self {
            client,
            current: Mutex::new(None),
            cleanup_timeout,
        }
    }

    /// Register `pending` as the acquisition to clean up on interrupt
    pub fn arm(&self, pending: PendingNode) -> Armed<'_, C> {
        *self.slot() = Some(pending);
        Armed { guard: self }
    }

    /// Whether an acquisition is currently registered
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot().is_some()
    }

    /// Run `acquisition` until it finishes or `interrupt` resolves.
    ///
    /// On interrupt the acquisition future is dropped, the registered node is
    /// removed, the session is closed and the outcome is
    /// [`AcquisitionOutcome::Interrupted`].
    ///
    /// # Errors
    ///
    /// Passes through errors returned by `acquisition`.
    pub async fn run<F, I>(
        &self,
        pending: PendingNode,
        acquisition: F,
        interrupt: I,
    ) -> Result<AcquisitionOutcome>
    where
        F: Future<Output = Result<AcquisitionOutcome>>,
        I: Future<Output = ()>,
    {
        let armed = self.arm(pending);

        let finished = tokio::select! {
            outcome = acquisition => Some(outcome),
            () = interrupt => None,
        };

        if let Some(outcome) = finished {
            drop(armed);
            return outcome;
        }

        tracing::info!("Received interrupt, running cleanup handler");
        self.interrupt().await;
        drop(armed);
        Ok(AcquisitionOutcome::Interrupted)
    }

    /// Remove the registered node, if created, and close the session.
    ///
    /// A node that is already gone is not an error. Each network call is
    /// bounded by the cleanup timeout; failures are logged, never returned.
    pub async fn interrupt(&self) {
        let pending = self.slot().take();

        if let Some(path) = pending.and_then(|pending| pending.path()) {
            match tokio::time::timeout(self.cleanup_timeout, self.client.delete(&path)).await {
                Ok(Ok(())) => tracing::info!("Removed lock node {path}"),
                Ok(Err(Error::NotFound(_))) => {
                    tracing::debug!("Couldn't cleanup node {path}, already gone");
                }
                Ok(Err(err)) => tracing::warn!("Couldn't cleanup node {path}: {err}"),
                Err(_) => tracing::warn!(
                    "Cleanup of {path} exceeded {:?}, giving up",
                    self.cleanup_timeout
                ),
            }
        }

        match tokio::time::timeout(self.cleanup_timeout, self.client.stop()).await {
            Ok(Ok(())) => tracing::debug!("Session closed"),
            Ok(Err(err)) => tracing::warn!("Couldn't close session: {err}"),
            Err(_) => tracing::warn!("Closing the session exceeded {:?}", self.cleanup_timeout),
        }
    }
}
