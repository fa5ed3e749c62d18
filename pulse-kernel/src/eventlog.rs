//! Event log writer: persists every telemetry sample twice, into the
//! single overwritten `telemetry/latest` slot and into the append-only
//! `telemetry/history` collection. History entries are keyed by arrival
//! milliseconds paired with a monotone sequence number, so two samples in
//! the same millisecond cannot collide. Telemetry is best-effort: without
//! a store the writer drops samples silently, and write failures are
//! logged rather than surfaced, because losing a sample beats blocking
//! the live view.

use crate::models::TelemetrySample;
use crate::store::{DurableStore, StoreSubscription};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub const LATEST_PATH: &str = "telemetry/latest";
pub const HISTORY_PATH: &str = "telemetry/history";

pub struct EventLogWriter {
    store: Option<Arc<dyn DurableStore>>,
    seq: AtomicU64,
}

fn history_key(arrival_ms: i128, seq: u64) -> String {
    format!("{arrival_ms}-{seq:06}")
}

impl EventLogWriter {
    pub fn new(store: Option<Arc<dyn DurableStore>>) -> Self {
        Self {
            store,
            seq: AtomicU64::new(1),
        }
    }

    /// Overwrites the latest slot and appends to history. Never fails:
    /// storage trouble is logged and the sample is dropped.
    pub async fn record(&self, sample: &TelemetrySample) {
        let Some(store) = &self.store else {
            debug!("no store configured, dropping telemetry sample");
            return;
        };
        let value = match serde_json::to_value(sample) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "unserializable telemetry sample");
                return;
            }
        };

        if let Err(e) = store.write(LATEST_PATH, value.clone()).await {
            warn!(error = %e, "failed to write latest telemetry slot");
        }

        let arrival_ms = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let path = format!("{HISTORY_PATH}/{}", history_key(arrival_ms, seq));
        if let Err(e) = store.write(&path, value).await {
            warn!(error = %e, "failed to append telemetry history entry");
        }
    }

    /// Watches the latest slot and forwards every parseable sample to
    /// `callback`. Null or malformed snapshots are not forwarded.
    pub fn stream_latest(
        &self,
        callback: impl Fn(TelemetrySample) + Send + Sync + 'static,
    ) -> StoreSubscription {
        let Some(store) = &self.store else {
            return StoreSubscription::noop();
        };
        store.subscribe(
            LATEST_PATH,
            Arc::new(move |value| {
                if value.is_null() {
                    return;
                }
                match serde_json::from_value::<TelemetrySample>(value) {
                    Ok(sample) => callback(sample),
                    Err(e) => debug!(error = %e, "ignoring unparseable latest snapshot"),
                }
            }),
        )
    }
}
