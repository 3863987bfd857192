//! lock, rlock and wlock

use std::{future::Future, io::Write, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use lockpick_core::{
    AcquisitionOutcome, CancellationGuard, CoordinationClient, LockAcquirer, LockDescriptor,
    LockMode, LockPath, RetryPolicy,
};

use crate::Error;

/// Acquire command options
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub lock_path: LockPath,
    pub mode: LockMode,
    pub identifier: Option<String>,
    pub policy: RetryPolicy,
    pub ephemeral: bool,
    pub cleanup_timeout: Duration,
}

/// Run an acquisition and print the held node path.
///
/// `interrupt` resolving before the outcome removes any created node and
/// closes the session.
///
/// # Errors
///
/// Returns an error if:
/// - The lock is not acquired within the retry budget
/// - The acquisition is interrupted
/// - The coordination service fails
pub async fn run<C, I>(
    client: Arc<C>,
    options: &AcquireOptions,
    interrupt: I,
    out: &mut impl Write,
) -> Result<()>
where
    C: CoordinationClient + ?Sized + 'static,
    I: Future<Output = ()>,
{
    let descriptor = LockDescriptor::new(
        options.lock_path.clone(),
        options.mode,
        options.identifier.clone(),
    )
    .ephemeral(options.ephemeral);
    let pending = descriptor.pending();

    let guard = CancellationGuard::new(Arc::clone(&client), options.cleanup_timeout);
    let acquirer = LockAcquirer::new(client);

    let outcome = guard
        .run(pending, acquirer.acquire(descriptor, options.policy), interrupt)
        .await?;

    match outcome {
        AcquisitionOutcome::Acquired(handle) => {
            tracing::info!("{}", acquired_message(&options.lock_path, &handle.node_path()));
            tracing::debug!("Held by {:?} since {}", handle.identity(), handle.acquired_at());
            writeln!(out, "{}", handle.into_node_path()).context("Failed to write node path")?;
            Ok(())
        }
        AcquisitionOutcome::TimedOut => {
            tracing::error!("Failed to acquire lock within timeout!");
            Err(Error::AcquireTimeout.into())
        }
        AcquisitionOutcome::Interrupted => {
            Err(Error::Interrupted(options.lock_path.to_string()).into())
        }
        AcquisitionOutcome::Failed(err) => Err(Error::Lock(err).into()),
    }
}

fn acquired_message(lock_path: &LockPath, node_path: &str) -> String {
    format!("Lock {lock_path} with path {node_path} acquired")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquired_message_names_lock_and_node() -> Result<()> {
        let lock_path = LockPath::new("/mylock")?;
        assert_eq!(
            acquired_message(&lock_path, "/mylock/abc__lock__0000000001"),
            "Lock /mylock with path /mylock/abc__lock__0000000001 acquired"
        );
        Ok(())
    }
}
