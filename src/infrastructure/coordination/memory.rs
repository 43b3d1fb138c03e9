//! In-memory coordination store for tests and local development.
//!
//! Nodes live in a sorted map keyed by absolute path; parents are created
//! implicitly. Besides the store operations it can simulate an outage
//! (`set_available(false)`, which also drops every pending watch) and lost
//! notifications (`set_deliver_watches(false)`, which leaves watches
//! pending without ever firing them).

use super::{paths, CoordinationStore, Watch, WatchEvent};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::oneshot;

pub struct MemoryStore {
    nodes: RwLock<BTreeMap<String, Vec<u8>>>,
    watches: Mutex<HashMap<String, Vec<oneshot::Sender<WatchEvent>>>>,
    available: AtomicBool,
    deliver_watches: AtomicBool,
    connects: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            watches: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            deliver_watches: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
        }
    }

    /// Creates or replaces a node, creating missing parents.
    pub fn put(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut created = Vec::new();
        {
            let mut nodes = self.nodes.write();
            let mut ancestors = Vec::new();
            let mut current = paths::parent(path);
            while let Some(p) = current {
                if p == "/" {
                    break;
                }
                ancestors.push(p);
                current = paths::parent(p);
            }
            for ancestor in ancestors.into_iter().rev() {
                if !nodes.contains_key(ancestor) {
                    nodes.insert(ancestor.to_string(), Vec::new());
                    created.push(ancestor.to_string());
                }
            }
            if nodes.insert(path.to_string(), data.into()).is_none() {
                created.push(path.to_string());
            }
        }
        for node in created {
            if let Some(parent) = paths::parent(&node) {
                self.fire(parent);
            }
        }
    }

    pub fn put_json(&self, path: &str, value: &serde_json::Value) {
        self.put(path, value.to_string());
    }

    /// Removes a node and everything below it.
    pub fn delete(&self, path: &str) -> bool {
        let existed = {
            let mut nodes = self.nodes.write();
            let prefix = format!("{}/", path);
            let existed = nodes.remove(path).is_some();
            nodes.retain(|k, _| !k.starts_with(&prefix));
            existed
        };
        if existed {
            if let Some(parent) = paths::parent(path) {
                self.fire(parent);
            }
        }
        existed
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.read().contains_key(path)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            self.watches.lock().clear();
        }
    }

    pub fn set_deliver_watches(&self, deliver: bool) {
        self.deliver_watches.store(deliver, Ordering::SeqCst);
    }

    pub fn pending_watches(&self, path: &str) -> usize {
        self.watches.lock().get(path).map_or(0, Vec::len)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn fire(&self, path: &str) {
        if !self.deliver_watches.load(Ordering::SeqCst) {
            return;
        }
        let senders = self.watches.lock().remove(path);
        for tx in senders.into_iter().flatten() {
            let _ = tx.send(WatchEvent::ChildrenChanged(path.to_string()));
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::TransientConnection(
                "coordination store connection lost".to_string(),
            ))
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn connect(&self) -> Result<()> {
        self.ensure_available()?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_available()?;
        Ok(self.nodes.read().get(path).cloned())
    }

    async fn children(&self, path: &str) -> Result<Option<Vec<String>>> {
        self.ensure_available()?;
        let nodes = self.nodes.read();
        if path != "/" && !nodes.contains_key(path) {
            return Ok(None);
        }
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let children = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| &k[prefix.len()..])
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        Ok(Some(children))
    }

    async fn watch_children(&self, path: &str) -> Result<Watch> {
        self.ensure_available()?;
        let (tx, rx) = oneshot::channel();
        self.watches
            .lock()
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
