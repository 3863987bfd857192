//! Lock acquisition state machine.
//!
//! `Idle → Acquiring → {Acquired, TimedOut, Interrupted, Failed}`
//!
//! The blocking acquire runs on a spawned worker. The controlling flow polls
//! it every `retry_sleep`, reporting the current contenders each time the
//! worker is still waiting. After `retry_count` polls the worker's token is
//! cancelled and its final answer is collected, so no worker outlives the
//! attempt.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::{
    contenders::{by_sequence, holders, list_contenders},
    node::{Contender, LockHandle},
    recipe::LockDescriptor,
    CoordinationClient, Error, LockPath, Result,
};

/// Poll cadence of an acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_count: u32,
    retry_sleep: Duration,
}

impl RetryPolicy {
    /// Create a policy polling `retry_count` times, `retry_sleep` apart
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when `retry_sleep` is zero.
    pub fn new(retry_count: u32, retry_sleep: Duration) -> Result<Self> {
        if retry_sleep.is_zero() {
            return Err(Error::InvalidConfig(
                "retry sleep must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            retry_count,
            retry_sleep,
        })
    }

    /// Number of polls
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Wait between polls
    #[must_use]
    pub const fn retry_sleep(&self) -> Duration {
        self.retry_sleep
    }

    /// Total time the worker may wait: `retry_count × retry_sleep`
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.retry_sleep.saturating_mul(self.retry_count)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_sleep: Duration::from_secs(3),
        }
    }
}

/// Terminal result of one acquisition attempt
#[derive(Debug)]
pub enum AcquisitionOutcome {
    /// The lock is held
    Acquired(LockHandle),
    /// The deadline passed before the node became eligible
    TimedOut,
    /// The attempt was interrupted from outside
    Interrupted,
    /// The worker failed
    Failed(Error),
}

impl AcquisitionOutcome {
    /// Whether the lock was acquired
    #[must_use]
    pub const fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}

/// Receives contention snapshots while an acquisition waits
pub trait ContentionObserver: Send + Sync {
    /// Called with the contenders seen on one poll that found the lock busy
    fn waiting(&self, lock_path: &LockPath, contenders: &[Contender]);
}

/// Reports contention through `tracing` at WARN level, in queue order
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ContentionObserver for LogObserver {
    fn waiting(&self, lock_path: &LockPath, contenders: &[Contender]) {
        tracing::warn!("Waiting to acquire lock, contenders are : ");
        for contender in by_sequence(contenders.to_vec()) {
            tracing::warn!("{contender}");
        }
        tracing::debug!(
            "{} contender(s) on {lock_path}, {} holding",
            contenders.len(),
            holders(contenders).len()
        );
    }
}

/// Drives lock acquisitions against one client session
pub struct LockAcquirer<C: ?Sized> {
    client: Arc<C>,
    observer: Arc<dyn ContentionObserver>,
}

impl<C> LockAcquirer<C>
where
    C: CoordinationClient + ?Sized + 'static,
{
    /// Create an acquirer that logs contention
    #[must_use]
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            observer: Arc::new(LogObserver),
        }
    }

    /// Replace the contention observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ContentionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run one acquisition attempt to its terminal outcome.
    ///
    /// Dropping the returned future cancels the worker, which then removes any
    /// node it created.
    ///
    /// # Errors
    ///
    /// Coordination errors from the contender listing between polls are fatal;
    /// the worker is cancelled and collected before they are returned.
    /// Failures inside the worker become [`AcquisitionOutcome::Failed`].
    pub async fn acquire(
        &self,
        descriptor: LockDescriptor,
        policy: RetryPolicy,
    ) -> Result<AcquisitionOutcome> {
        let lock_path = descriptor.lock_path().clone();
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        tracing::debug!("Trying to acquire lock on {lock_path}");
        let mut worker = {
            let client = Arc::clone(&self.client);
            let token = cancel.clone();
            let deadline = policy.deadline();
            tokio::spawn(async move { descriptor.acquire(&*client, deadline, &token).await })
        };

        for attempt in 1..=policy.retry_count() {
            match tokio::time::timeout(policy.retry_sleep(), &mut worker).await {
                Ok(joined) => return Ok(self.settle(&lock_path, joined).await),
                Err(_) => {
                    tracing::debug!("Poll {attempt}/{} on {lock_path} timed out", policy.retry_count());
                    if let Err(err) = self.report(&lock_path).await {
                        cancel.cancel();
                        self.abandon(worker.await).await;
                        return Err(err);
                    }
                }
            }
        }

        cancel.cancel();
        let joined = worker.await;
        Ok(self.settle(&lock_path, joined).await)
    }

    async fn settle(
        &self,
        lock_path: &LockPath,
        joined: std::result::Result<Result<LockHandle>, JoinError>,
    ) -> AcquisitionOutcome {
        match joined {
            Ok(Ok(handle)) => AcquisitionOutcome::Acquired(handle),
            Ok(Err(Error::AcquisitionTimeout(_) | Error::Cancelled(_))) => {
                tracing::warn!("LockTimeout raised by locker on {lock_path}");
                if let Err(err) = self.report(lock_path).await {
                    tracing::debug!("Couldn't list contenders after timeout: {err}");
                }
                AcquisitionOutcome::TimedOut
            }
            Ok(Err(err)) => AcquisitionOutcome::Failed(err),
            Err(join_err) => AcquisitionOutcome::Failed(Error::coordination(format!(
                "lock worker stopped unexpectedly: {join_err}"
            ))),
        }
    }

    /// Give back whatever the worker ended with after the attempt failed
    async fn abandon(&self, joined: std::result::Result<Result<LockHandle>, JoinError>) {
        match joined {
            Ok(Ok(handle)) => {
                let node_path = handle.node_path();
                match handle.release(&*self.client).await {
                    Ok(()) => tracing::debug!("Released {node_path} acquired after failure"),
                    Err(err) => tracing::warn!("Couldn't release {node_path}: {err}"),
                }
            }
            Ok(Err(err)) => tracing::debug!("Abandoned lock worker ended with: {err}"),
            Err(join_err) => tracing::debug!("Abandoned lock worker stopped: {join_err}"),
        }
    }

    async fn report(&self, lock_path: &LockPath) -> Result<()> {
        match list_contenders(&*self.client, lock_path).await {
            Ok(contenders) => {
                self.observer.waiting(lock_path, &contenders);
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!("Lock path {lock_path} not created yet");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
