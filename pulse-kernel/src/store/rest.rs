//! REST store backend. Talks to a Firebase-RTDB-style document store:
//! every path maps to `{base}/{path}.json` and supports PUT/GET/DELETE.
//! The store has no push channel we can use from here, so `subscribe` is
//! a short-interval polling watcher.

use super::{ChangeCallback, DurableStore, StoreError, StoreSubscription};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base: String,
}

impl RestStore {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base, path.trim_matches('/'))
    }

    async fn fetch(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Unreachable(format!(
                "read {} -> {}",
                path,
                response.status()
            )));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(if value.is_null() { None } else { Some(value) })
    }
}

#[async_trait]
impl DurableStore for RestStore {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.url(path))
            .json(&value)
            .send()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Unreachable(format!(
                "write {} -> {}",
                path,
                response.status()
            )));
        }
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.fetch(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Unreachable(format!(
                "delete {} -> {}",
                path,
                response.status()
            )));
        }
        Ok(())
    }

    fn subscribe(&self, path: &str, on_change: ChangeCallback) -> StoreSubscription {
        let store = self.clone();
        let path = path.to_string();
        let handle = tokio::spawn(async move {
            let mut last_seen: Option<Value> = None;
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                match store.fetch(&path).await {
                    Ok(current) => {
                        let current = current.unwrap_or(Value::Null);
                        // An absent path on the first poll is not a change.
                        let is_change = match &last_seen {
                            None => !current.is_null(),
                            Some(previous) => *previous != current,
                        };
                        if is_change {
                            debug!(path = %path, "watched path changed");
                            on_change(current.clone());
                        }
                        last_seen = Some(current);
                    }
                    Err(e) => {
                        // Transient outage: keep polling, the presence
                        // broadcaster reports the store as offline.
                        warn!(path = %path, error = %e, "poll failed");
                    }
                }
            }
        });
        StoreSubscription::new(move || handle.abort())
    }

    async fn probe(&self) -> bool {
        // A shallow read of the root is the cheapest request the store
        // answers; any well-formed response means it is reachable.
        let url = format!("{}/.json?shallow=true", self.base);
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
