//! In-process coordination store.
//!
//! [`MemoryStore`] models the node tree shared by every session;
//! [`MemoryClient`] is one session against it. Sequential names, distinct
//! `NotFound` deletes, ephemeral cleanup on `stop` and deletion watches all
//! behave like the real service, which makes the store suitable for driving
//! the lock protocol in tests and single-host setups.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{path::SEPARATOR, CoordinationClient, Error, Result};

#[derive(Debug, Default)]
struct Node {
    data: Vec<u8>,
    ephemeral_owner: Option<u64>,
    next_sequence: u64,
}

/// Node tree shared by all sessions
#[derive(Debug)]
pub struct MemoryStore {
    nodes: Mutex<BTreeMap<String, Node>>,
    changes: watch::Sender<u64>,
    next_session: AtomicU64,
    unavailable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(SEPARATOR.to_string(), Node::default());
        let (changes, _) = watch::channel(0);
        Self {
            nodes: Mutex::new(nodes),
            changes,
            next_session: AtomicU64::new(1),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl MemoryStore {
    /// Create an empty store holding only the root node
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate losing (or regaining) the connection to the service.
    ///
    /// While unavailable every operation fails with a coordination error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
        self.notify();
    }

    /// Number of nodes currently stored, root included
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes().len()
    }

    fn nodes(&self) -> MutexGuard<'_, BTreeMap<String, Node>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::coordination("connection loss"))
        } else {
            Ok(())
        }
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn children_of<'a>(
    nodes: &'a BTreeMap<String, Node>,
    path: &str,
) -> impl Iterator<Item = &'a str> + 'a {
    let prefix = if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    };
    let depth = prefix.len();
    nodes
        .range(prefix.clone()..)
        .take_while(move |(key, _)| key.starts_with(&prefix))
        .filter_map(move |(key, _)| {
            let rest = &key[depth..];
            (!rest.is_empty() && !rest.contains(SEPARATOR)).then_some(rest)
        })
}

/// One session against a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryClient {
    store: Arc<MemoryStore>,
    session: u64,
    started: AtomicBool,
}

impl MemoryClient {
    /// Create a session handle; call `start` before use
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let session = store.next_session.fetch_add(1, Ordering::SeqCst);
        Self {
            store,
            session,
            started: AtomicBool::new(false),
        }
    }

    fn check(&self) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::coordination("session is not started"));
        }
        self.store.check_available()
    }
}

#[async_trait]
impl CoordinationClient for MemoryClient {
    async fn start(&self) -> Result<()> {
        self.store.check_available()?;
        self.started.store(true, Ordering::SeqCst);
        tracing::debug!(session = self.session, "memory session started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let removed = {
            let mut nodes = self.store.nodes();
            let before = nodes.len();
            nodes.retain(|_, node| node.ephemeral_owner != Some(self.session));
            before - nodes.len()
        };
        tracing::debug!(
            session = self.session,
            removed,
            "memory session stopped"
        );
        self.store.notify();
        Ok(())
    }

    async fn ensure_path(&self, path: &str) -> Result<()> {
        self.check()?;
        let mut created = false;
        {
            let mut nodes = self.store.nodes();
            let mut current = String::new();
            for segment in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
                current.push(SEPARATOR);
                current.push_str(segment);
                if !nodes.contains_key(&current) {
                    nodes.insert(current.clone(), Node::default());
                    created = true;
                }
            }
        }
        if created {
            self.store.notify();
        }
        Ok(())
    }

    async fn create_sequential(
        &self,
        parent: &str,
        prefix: &str,
        payload: &[u8],
        ephemeral: bool,
    ) -> Result<String> {
        self.check()?;
        let name = {
            let mut nodes = self.store.nodes();
            let parent_node = nodes
                .get_mut(parent)
                .ok_or_else(|| Error::NotFound(parent.to_string()))?;
            let name = format!("{prefix}{:010}", parent_node.next_sequence);
            parent_node.next_sequence += 1;
            nodes.insert(
                child_path(parent, &name),
                Node {
                    data: payload.to_vec(),
                    ephemeral_owner: ephemeral.then_some(self.session),
                    next_sequence: 0,
                },
            );
            name
        };
        self.store.notify();
        Ok(name)
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.check()?;
        let nodes = self.store.nodes();
        if !nodes.contains_key(path) {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(children_of(&nodes, path).map(str::to_string).collect())
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        self.check()?;
        self.store
            .nodes()
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.check()?;
        Ok(self.store.nodes().contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check()?;
        {
            let mut nodes = self.store.nodes();
            if !nodes.contains_key(path) {
                return Err(Error::NotFound(path.to_string()));
            }
            if path == "/" || children_of(&nodes, path).next().is_some() {
                return Err(Error::coordination(format!("node {path} is not empty")));
            }
            nodes.remove(path);
        }
        self.store.notify();
        Ok(())
    }

    async fn wait_deleted(&self, path: &str) -> Result<()> {
        let mut changes = self.store.changes.subscribe();
        loop {
            self.check()?;
            let present = self.store.nodes().contains_key(path);
            if !present {
                return Ok(());
            }
            changes
                .changed()
                .await
                .map_err(|_| Error::coordination("memory store closed"))?;
        }
    }
}
