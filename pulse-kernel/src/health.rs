use crate::presence::PresenceBroadcaster;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub store_online: bool,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
    pub plc_status: String,
    pub samples_recorded: u64,
}

/// Aggregates the kernel's own vital signs for `GET /system/health`.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_status: Arc<Mutex<String>>,
    mqtt_reconnects: Arc<AtomicU32>,
    plc_status: Arc<Mutex<String>>,
    samples_recorded: Arc<AtomicU64>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_status: Arc::new(Mutex::new("connecting".to_string())),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            plc_status: Arc::new(Mutex::new("unknown".to_string())),
            samples_recorded: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn set_plc_status(&self, status: &str) {
        *self.plc_status.lock() = status.to_string();
    }

    pub fn note_sample(&self) {
        self.samples_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, presence: &PresenceBroadcaster) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            store_online: presence.is_online(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
            plc_status: self.plc_status.lock().clone(),
            samples_recorded: self.samples_recorded.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
