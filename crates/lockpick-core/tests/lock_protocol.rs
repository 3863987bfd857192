//! Lock protocol behaviour against the in-memory store.
//!
//! Time is paused in every async test, so multi-second retry policies run
//! instantly while keeping their ordering.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use lockpick_core::{
    guard::DEFAULT_CLEANUP_TIMEOUT, list_contenders, release, release_node, AcquisitionOutcome,
    CancellationGuard, Contender, ContentionObserver, CoordinationClient, Error, LockAcquirer,
    LockDescriptor, LockHandle, LockMode, LockPath, MemoryClient, MemoryStore, Result,
    RetryPolicy,
};

#[derive(Default)]
struct RecordingObserver {
    reports: Mutex<Vec<Vec<Contender>>>,
}

impl RecordingObserver {
    fn reports(&self) -> Vec<Vec<Contender>> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl ContentionObserver for RecordingObserver {
    fn waiting(&self, _lock_path: &LockPath, contenders: &[Contender]) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(contenders.to_vec());
        }
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    client: Arc<MemoryClient>,
    observer: Arc<RecordingObserver>,
}

impl Harness {
    async fn new() -> Result<Self> {
        let store = MemoryStore::new();
        let client = Self::session(&store).await?;
        Ok(Self {
            store,
            client,
            observer: Arc::new(RecordingObserver::default()),
        })
    }

    async fn session(store: &Arc<MemoryStore>) -> Result<Arc<MemoryClient>> {
        let client = Arc::new(MemoryClient::new(Arc::clone(store)));
        client.start().await?;
        Ok(client)
    }

    fn acquirer(&self) -> LockAcquirer<MemoryClient> {
        LockAcquirer::new(Arc::clone(&self.client))
            .with_observer(Arc::clone(&self.observer) as Arc<dyn ContentionObserver>)
    }

    async fn acquire(
        &self,
        path: &str,
        mode: LockMode,
        identity: Option<&str>,
        retry_count: u32,
        retry_sleep_secs: u64,
    ) -> Result<AcquisitionOutcome> {
        let descriptor =
            LockDescriptor::new(LockPath::new(path)?, mode, identity.map(str::to_string));
        let policy = RetryPolicy::new(retry_count, Duration::from_secs(retry_sleep_secs))?;
        self.acquirer().acquire(descriptor, policy).await
    }
}

fn acquired(outcome: AcquisitionOutcome) -> Result<LockHandle> {
    match outcome {
        AcquisitionOutcome::Acquired(handle) => Ok(handle),
        other => Err(Error::coordination(format!("expected Acquired, got {other:?}"))),
    }
}

#[tokio::test(start_paused = true)]
async fn test_uncontended_lock_acquires_without_diagnostics() -> Result<()> {
    let harness = Harness::new().await?;

    let outcome = harness
        .acquire("/jobs/nightly", LockMode::Exclusive, None, 3, 3)
        .await?;

    let handle = acquired(outcome)?;
    assert!(handle.node_path().starts_with("/jobs/nightly/"));
    assert!(harness.observer.reports().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_second_exclusive_waits_for_release() -> Result<()> {
    let harness = Arc::new(Harness::new().await?);
    let first = acquired(
        harness
            .acquire("/res", LockMode::Exclusive, Some("first"), 3, 1)
            .await?,
    )?;

    let second = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness
                .acquire("/res", LockMode::Exclusive, Some("second"), 30, 1)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!second.is_finished(), "second lock held concurrently");
    let waiting = list_contenders(&*harness.client, first.lock_path()).await?;
    assert_eq!(waiting.len(), 2);

    first.release(&*harness.client).await?;

    let outcome = tokio::time::timeout(Duration::from_secs(5), second)
        .await
        .map_err(|_| Error::coordination("second never acquired"))?
        .map_err(|e| Error::coordination(e.to_string()))??;
    let second = acquired(outcome)?;
    assert_eq!(second.identity(), Some("second"));
    assert!(!harness.observer.reports().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_list_returns_every_participant_with_identity() -> Result<()> {
    let harness = Harness::new().await?;
    let mut handles = Vec::new();
    for reader in ["r0", "r1", "r2"] {
        handles.push(acquired(
            harness
                .acquire("/shared", LockMode::ReadShared, Some(reader), 1, 1)
                .await?,
        )?);
    }

    let contenders = list_contenders(&*harness.client, &LockPath::new("/shared")?).await?;

    assert_eq!(contenders.len(), 3);
    for handle in &handles {
        let entry = contenders
            .iter()
            .find(|c| c.path == handle.node_path())
            .ok_or_else(|| Error::NotFound(handle.node_path()))?;
        assert_eq!(Some(entry.identity.as_str()), handle.identity());
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_list_missing_path_is_not_found() -> Result<()> {
    let harness = Harness::new().await?;
    let result = list_contenders(&*harness.client, &LockPath::new("/absent")?).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_writer_waits_for_all_readers() -> Result<()> {
    let harness = Arc::new(Harness::new().await?);
    let r1 = acquired(harness.acquire("/rw", LockMode::ReadShared, None, 1, 1).await?)?;
    let r2 = acquired(harness.acquire("/rw", LockMode::ReadShared, None, 1, 1).await?)?;

    let writer = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness
                .acquire("/rw", LockMode::WriteExclusive, None, 20, 1)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(1500)).await;

    r1.release(&*harness.client).await?;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!writer.is_finished());

    r2.release(&*harness.client).await?;
    let outcome = writer
        .await
        .map_err(|e| Error::coordination(e.to_string()))??;
    assert_eq!(acquired(outcome)?.mode(), LockMode::WriteExclusive);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_time_out_without_orphans() -> Result<()> {
    let harness = Harness::new().await?;
    let holder = acquired(harness.acquire("/z", LockMode::Exclusive, None, 0, 1).await?)?;

    let outcome = harness.acquire("/z", LockMode::Exclusive, None, 0, 1).await?;

    assert!(matches!(outcome, AcquisitionOutcome::TimedOut));
    let remaining = list_contenders(&*harness.client, holder.lock_path()).await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path, holder.node_path());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_service_failure_is_reported_as_failed() -> Result<()> {
    let harness = Harness::new().await?;
    harness.store.set_unavailable(true);

    let outcome = harness.acquire("/down", LockMode::Exclusive, None, 2, 1).await?;

    assert!(matches!(
        outcome,
        AcquisitionOutcome::Failed(Error::Coordination(_))
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_checks_identity() -> Result<()> {
    let harness = Harness::new().await?;
    let handle = acquired(
        harness
            .acquire("/idlock", LockMode::Exclusive, Some("owner"), 1, 1)
            .await?,
    )?;
    let node = handle.into_node_path();

    let refused = release_node(&*harness.client, &node, Some("intruder")).await;
    assert!(matches!(refused, Err(Error::IdentityMismatch { .. })));
    assert!(harness.client.exists(&node).await?);

    release_node(&*harness.client, &node, Some("owner")).await?;
    assert!(!harness.client.exists(&node).await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_without_identity_deletes() -> Result<()> {
    let harness = Harness::new().await?;
    let node = acquired(
        harness
            .acquire("/anon", LockMode::Exclusive, Some("owner"), 1, 1)
            .await?,
    )?
    .into_node_path();

    assert!(release(&*harness.client, &node, None).await?);
    assert!(!harness.client.exists(&node).await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_twice_succeeds_once() -> Result<()> {
    let harness = Harness::new().await?;
    let node = acquired(harness.acquire("/twice", LockMode::Exclusive, None, 1, 1).await?)?
        .into_node_path();

    assert!(release(&*harness.client, &node, None).await?);
    assert!(!release(&*harness.client, &node, None).await?);
    assert!(matches!(
        release_node(&*harness.client, &node, None).await,
        Err(Error::NotFound(_))
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_propagates_service_errors() -> Result<()> {
    let harness = Harness::new().await?;
    harness.store.set_unavailable(true);
    let result = release(&*harness.client, "/x/n__lock__0000000000", None).await;
    assert!(matches!(result, Err(Error::Coordination(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_scenarios_a_b_c() -> Result<()> {
    let harness = Harness::new().await?;
    let lock_path = LockPath::new("/jobs/nightly")?;
    harness.client.ensure_path(lock_path.as_str()).await?;

    // A: worker-1 takes the lock
    let held = acquired(
        harness
            .acquire("/jobs/nightly", LockMode::Exclusive, Some("worker-1"), 3, 1)
            .await?,
    )?;
    let node = held.into_node_path();
    assert!(node.starts_with("/jobs/nightly/"));
    let listed = list_contenders(&*harness.client, &lock_path).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].to_string(), format!("'worker-1' {node}"));

    // B: a second locker times out and sees worker-1 in its diagnostics
    let outcome = harness
        .acquire("/jobs/nightly", LockMode::Exclusive, None, 1, 1)
        .await?;
    assert!(matches!(outcome, AcquisitionOutcome::TimedOut));
    let reports = harness.observer.reports();
    assert!(reports
        .iter()
        .flatten()
        .any(|c| c.identity == "worker-1" && c.path == node));

    // C: wrong identity refused, right identity releases
    assert!(!release(&*harness.client, &node, Some("worker-2")).await?);
    assert!(harness.client.exists(&node).await?);
    assert!(release(&*harness.client, &node, Some("worker-1")).await?);
    assert!(list_contenders(&*harness.client, &lock_path).await?.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_removes_in_flight_node_and_closes_session() -> Result<()> {
    let harness = Harness::new().await?;
    let holder_session = Harness::session(&harness.store).await?;
    let lock_path = LockPath::new("/busy")?;
    let holder = LockDescriptor::new(lock_path.clone(), LockMode::Exclusive, Some("holder".into()))
        .acquire(
            &*holder_session,
            Duration::ZERO,
            &tokio_util::sync::CancellationToken::new(),
        )
        .await?;

    let guard = CancellationGuard::new(Arc::clone(&harness.client), DEFAULT_CLEANUP_TIMEOUT);
    let descriptor = LockDescriptor::new(lock_path.clone(), LockMode::Exclusive, None);
    let pending = descriptor.pending();
    let acquirer = harness.acquirer();
    let policy = RetryPolicy::new(10, Duration::from_secs(1))?;

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let _ = tx.send(());
    });

    let outcome = guard
        .run(pending, acquirer.acquire(descriptor, policy), async {
            let _ = rx.await;
        })
        .await?;

    assert!(matches!(outcome, AcquisitionOutcome::Interrupted));
    assert!(!guard.is_armed());
    assert!(harness.client.get_children("/busy").await.is_err(), "session closed");
    let remaining = holder_session.get_children(lock_path.as_str()).await?;
    assert_eq!(remaining, vec![holder.node_name().to_string()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_guard_disarms_after_normal_completion() -> Result<()> {
    let harness = Harness::new().await?;
    let guard = CancellationGuard::new(Arc::clone(&harness.client), DEFAULT_CLEANUP_TIMEOUT);
    let descriptor = LockDescriptor::new(LockPath::new("/calm")?, LockMode::Exclusive, None);
    let pending = descriptor.pending();

    let outcome = guard
        .run(
            pending,
            harness
                .acquirer()
                .acquire(descriptor, RetryPolicy::new(1, Duration::from_secs(1))?),
            std::future::pending(),
        )
        .await?;

    assert!(outcome.is_acquired());
    assert!(!guard.is_armed());
    assert!(harness.client.exists("/calm").await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_before_node_exists_only_closes_session() -> Result<()> {
    let harness = Harness::new().await?;
    let guard = CancellationGuard::new(Arc::clone(&harness.client), DEFAULT_CLEANUP_TIMEOUT);
    let descriptor = LockDescriptor::new(LockPath::new("/never")?, LockMode::Exclusive, None);
    let _armed = guard.arm(descriptor.pending());

    guard.interrupt().await;

    assert!(!guard.is_armed());
    assert_eq!(harness.store.node_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_huge_retry_sleep_still_acquires() -> Result<()> {
    let harness = Harness::new().await?;

    let outcome = harness
        .acquire("/p", LockMode::Exclusive, None, 1, u64::MAX)
        .await?;

    let handle = acquired(outcome)?;
    assert!(harness.client.exists(&handle.node_path()).await?);
    Ok(())
}

/// Delegates to a memory session, but the first contender listing made by
/// the poll loop frees the lock and then fails.
struct ListingFailsAfterRelease {
    inner: Arc<MemoryClient>,
    holder: String,
    listings: AtomicUsize,
}

#[async_trait]
impl CoordinationClient for ListingFailsAfterRelease {
    async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    async fn stop(&self) -> Result<()> {
        self.inner.stop().await
    }

    async fn ensure_path(&self, path: &str) -> Result<()> {
        self.inner.ensure_path(path).await
    }

    async fn create_sequential(
        &self,
        parent: &str,
        prefix: &str,
        payload: &[u8],
        ephemeral: bool,
    ) -> Result<String> {
        self.inner
            .create_sequential(parent, prefix, payload, ephemeral)
            .await
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        // Listing 0 is the worker's first look; listing 1 is the first poll.
        if self.listings.fetch_add(1, Ordering::SeqCst) == 1 {
            self.inner.delete(&self.holder).await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
            return Err(Error::coordination("listing dropped"));
        }
        self.inner.get_children(path).await
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.get_data(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn wait_deleted(&self, path: &str) -> Result<()> {
        self.inner.wait_deleted(path).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_lock_won_during_failed_listing_is_given_back() -> Result<()> {
    let harness = Harness::new().await?;
    let holder = acquired(
        harness
            .acquire("/flaky", LockMode::Exclusive, None, 1, 1)
            .await?,
    )?;

    let client = Arc::new(ListingFailsAfterRelease {
        inner: Arc::clone(&harness.client),
        holder: holder.node_path(),
        listings: AtomicUsize::new(0),
    });
    let descriptor = LockDescriptor::new(LockPath::new("/flaky")?, LockMode::Exclusive, None);
    let result = LockAcquirer::new(client)
        .acquire(descriptor, RetryPolicy::new(3, Duration::from_secs(1))?)
        .await;

    assert!(matches!(result, Err(Error::Coordination(_))));
    assert!(harness.client.get_children("/flaky").await?.is_empty());
    Ok(())
}
