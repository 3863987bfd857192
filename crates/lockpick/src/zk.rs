//! ZooKeeper-backed coordination client
//!
//! The `zookeeper` crate exposes a blocking API; every call runs on the
//! blocking pool so the acquisition worker and the polling flow can share one
//! session without stalling the runtime.
//!
//! The chroot of the connect string is applied here rather than by the
//! server, so the chroot node itself can be created on a fresh ensemble.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use lockpick_core::{CoordinationClient, Error, Result};
use tokio::sync::{oneshot, Mutex};
use zookeeper::{Acl, CreateMode, WatchedEvent, ZkError, ZkState, ZooKeeper, ZooKeeperExt};

/// One ZooKeeper session
pub struct ZkClient {
    servers: String,
    chroot: Option<String>,
    session_timeout: Duration,
    session: Mutex<Option<Arc<ZooKeeper>>>,
}

impl ZkClient {
    /// Create a client for `connect_string` (`host:port[,host:port][/chroot]`)
    #[must_use]
    pub fn new(connect_string: &str, session_timeout: Duration) -> Self {
        let (servers, chroot) = split_chroot(connect_string);
        Self {
            servers: servers.to_string(),
            chroot: chroot.map(str::to_string),
            session_timeout,
            session: Mutex::new(None),
        }
    }

    /// `path` as seen by the server
    fn absolute(&self, path: &str) -> String {
        match self.chroot.as_deref() {
            None => path.to_string(),
            Some(chroot) if path == "/" => chroot.to_string(),
            Some(chroot) => format!("{chroot}{path}"),
        }
    }

    async fn session(&self) -> Result<Arc<ZooKeeper>> {
        self.session
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::coordination("ZooKeeper session is not started"))
    }

    async fn call<T, F>(&self, path: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ZooKeeper) -> std::result::Result<T, ZkError> + Send + 'static,
    {
        let zk = self.session().await?;
        let result = tokio::task::spawn_blocking(move || op(&zk))
            .await
            .map_err(|e| Error::coordination(format!("ZooKeeper call aborted: {e}")))?;
        result.map_err(|err| map_error(path, err))
    }
}

/// Split `host:port,host:port/chroot` into servers and chroot
fn split_chroot(connect_string: &str) -> (&str, Option<&str>) {
    match connect_string.find('/') {
        Some(at) => {
            let (servers, chroot) = connect_string.split_at(at);
            let chroot = chroot.trim_end_matches('/');
            (servers, Some(chroot).filter(|c| !c.is_empty()))
        }
        None => (connect_string, None),
    }
}

fn map_error(path: &str, err: ZkError) -> Error {
    match err {
        ZkError::NoNode => Error::NotFound(path.to_string()),
        other => Error::coordination(format!("{other:?} on {path}")),
    }
}

#[async_trait]
impl CoordinationClient for ZkClient {
    async fn start(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let servers = self.servers.clone();
        let chroot = self.chroot.clone();
        let timeout = self.session_timeout;
        let zk = tokio::task::spawn_blocking(move || {
            let zk = ZooKeeper::connect(&servers, timeout, |event: WatchedEvent| {
                tracing::debug!("ZooKeeper event: {event:?}");
            })?;
            if let Some(chroot) = chroot {
                zk.ensure_path(&chroot)?;
            }
            Ok::<_, ZkError>(zk)
        })
        .await
        .map_err(|e| Error::coordination(format!("ZooKeeper connect aborted: {e}")))?
        .map_err(|e| Error::coordination(format!("Failed to connect to {}: {e:?}", self.servers)))?;

        let _ = zk.add_listener(|state: ZkState| {
            tracing::debug!("ZooKeeper session state: {state:?}");
        });
        tracing::debug!("Connected to {} under {:?}", self.servers, self.chroot);
        *session = Some(Arc::new(zk));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(zk) = self.session.lock().await.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || zk.close())
            .await
            .map_err(|e| Error::coordination(format!("ZooKeeper close aborted: {e}")))?
            .map_err(|e| Error::coordination(format!("Failed to close session: {e:?}")))
    }

    async fn ensure_path(&self, path: &str) -> Result<()> {
        let target = self.absolute(path);
        self.call(path, move |zk| zk.ensure_path(&target)).await
    }

    async fn create_sequential(
        &self,
        parent: &str,
        prefix: &str,
        payload: &[u8],
        ephemeral: bool,
    ) -> Result<String> {
        let target = format!("{}/{prefix}", self.absolute(parent).trim_end_matches('/'));
        let data = payload.to_vec();
        let mode = if ephemeral {
            CreateMode::EphemeralSequential
        } else {
            CreateMode::PersistentSequential
        };

        let created = self
            .call(parent, move |zk| {
                zk.create(&target, data, Acl::open_unsafe().clone(), mode)
            })
            .await?;

        created
            .rsplit('/')
            .next()
            .map(str::to_string)
            .ok_or_else(|| Error::coordination(format!("Unexpected created path {created}")))
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        let target = self.absolute(path);
        self.call(path, move |zk| zk.get_children(&target, false)).await
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.absolute(path);
        self.call(path, move |zk| zk.get_data(&target, false).map(|(data, _)| data))
            .await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let target = self.absolute(path);
        self.call(path, move |zk| zk.exists(&target, false).map(|stat| stat.is_some()))
            .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.absolute(path);
        self.call(path, move |zk| zk.delete(&target, None)).await
    }

    async fn wait_deleted(&self, path: &str) -> Result<()> {
        loop {
            let (tx, rx) = oneshot::channel();
            let target = self.absolute(path);
            let tx = std::sync::Mutex::new(Some(tx));
            let present = self
                .call(path, move |zk| {
                    zk.exists_w(&target, move |event: WatchedEvent| {
                        if let Some(tx) = tx.lock().ok().and_then(|mut guard| guard.take()) {
                            let _ = tx.send(event);
                        }
                    })
                    .map(|stat| stat.is_some())
                })
                .await?;

            if !present {
                return Ok(());
            }

            match rx.await {
                Ok(event) => tracing::debug!("Watch on {path} fired: {event:?}"),
                Err(_) => return Err(Error::coordination(format!("Watch on {path} was dropped"))),
            }
        }
    }
}
