//! Durable store adapter: typed read/write/subscribe operations against the
//! external document store. No business logic lives here; the credential
//! service, event log and profile store all talk to the store through the
//! `DurableStore` trait so tests can swap in the in-memory backend.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

/// Callback invoked with the new value at a watched path.
/// A deleted path is reported as `Value::Null`.
pub type ChangeCallback = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("durable store unreachable: {0}")]
    Unreachable(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The contract every store backend implements.
///
/// Paths are hierarchical slash-separated strings (`otp/<subject>`,
/// `telemetry/history/<key>`). Reading a path that only has children
/// returns an object keyed by the child segments. `subscribe` watches a
/// single exact path and replays the current value to the new watcher
/// before reporting subsequent changes.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
    fn subscribe(&self, path: &str, on_change: ChangeCallback) -> StoreSubscription;
    /// Cheap reachability check, polled by the presence broadcaster.
    async fn probe(&self) -> bool;
}

/// Handle returned by `subscribe`. Dropping it (or calling `cancel`)
/// detaches the watcher; doing so more than once is a no-op.
pub struct StoreSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl StoreSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that watches nothing (store not configured).
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(f) = self.cancel.take() {
            f();
        }
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        if let Some(f) = self.cancel.take() {
            f();
        }
    }
}

/// Characters the store rejects inside a path segment.
const ILLEGAL_SEGMENT_CHARS: [char; 7] = ['.', '#', '$', '[', ']', '/', '@'];

/// Makes an identity (typically an email address) safe for use as a
/// storage key segment. `gaurav@example.com` -> `gaurav_example_com`.
pub fn sanitize_segment(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if ILLEGAL_SEGMENT_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}
