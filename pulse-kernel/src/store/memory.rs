//! In-memory store backend. Used by the test suite and by `store.mode:
//! memory` deployments that run the kernel without an external document
//! store. Reachability is a switchable flag so tests can simulate outages.

use super::{ChangeCallback, DurableStore, StoreError, StoreSubscription};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type ListenerMap = HashMap<String, Vec<(u64, ChangeCallback)>>;

pub struct MemoryStore {
    /// Flat map of full path -> value. Hierarchy is reconstructed on read.
    entries: Mutex<BTreeMap<String, Value>>,
    listeners: Arc<Mutex<ListenerMap>>,
    next_listener: AtomicU64,
    reachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(1),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulates losing (or regaining) the connection to the store.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unreachable("memory store offline".into()))
        }
    }

    /// Snapshot the callbacks for a path, then invoke them outside the
    /// listener lock so a callback may subscribe or unsubscribe freely.
    fn notify(&self, path: &str, value: &Value) {
        let callbacks: Vec<ChangeCallback> = {
            let listeners = self.listeners.lock();
            match listeners.get(path) {
                Some(subs) => subs.iter().map(|(_, cb)| cb.clone()).collect(),
                None => return,
            }
        };
        for cb in callbacks {
            cb(value.clone());
        }
    }

    /// Builds the object view of a path that only exists through children.
    fn collect_children(entries: &BTreeMap<String, Value>, path: &str) -> Option<Value> {
        let prefix = format!("{path}/");
        let mut children = serde_json::Map::new();
        for (key, value) in entries.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            children.insert(key[prefix.len()..].to_string(), value.clone());
        }
        if children.is_empty() {
            None
        } else {
            Some(Value::Object(children))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.check_reachable()?;
        self.entries.lock().insert(path.to_string(), value.clone());
        self.notify(path, &value);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.check_reachable()?;
        let entries = self.entries.lock();
        if let Some(value) = entries.get(path) {
            return Ok(Some(value.clone()));
        }
        Ok(Self::collect_children(&entries, path))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.check_reachable()?;
        {
            let mut entries = self.entries.lock();
            let prefix = format!("{path}/");
            entries.retain(|k, _| k != path && !k.starts_with(&prefix));
        }
        self.notify(path, &Value::Null);
        Ok(())
    }

    fn subscribe(&self, path: &str, on_change: ChangeCallback) -> StoreSubscription {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        // Replay the current value to the new watcher first.
        let current = {
            let entries = self.entries.lock();
            entries
                .get(path)
                .cloned()
                .or_else(|| Self::collect_children(&entries, path))
        };
        if let Some(value) = current {
            on_change(value);
        }
        self.listeners
            .lock()
            .entry(path.to_string())
            .or_default()
            .push((id, on_change));

        let listeners = self.listeners.clone();
        let path = path.to_string();
        StoreSubscription::new(move || {
            if let Some(subs) = listeners.lock().get_mut(&path) {
                subs.retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }

    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
