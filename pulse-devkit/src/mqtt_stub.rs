/*!
Mock MQTT client for tests and broker-less development.

Records everything a component publishes or subscribes to, and lets a
test inject incoming messages through a channel.
*/

use chrono::Utc;
use rumqttc::QoS;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Clone, Default)]
pub struct MockMqttClient {
    published: Arc<Mutex<Vec<RecordedMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    incoming: Arc<Mutex<Option<mpsc::UnboundedSender<RecordedMessage>>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the receiving end for messages injected with
    /// `simulate_incoming`.
    pub fn incoming_receiver(&self) -> mpsc::UnboundedReceiver<RecordedMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.incoming.lock().unwrap() = Some(tx);
        rx
    }

    /// Signature-compatible with `rumqttc::AsyncClient::publish`.
    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = RecordedMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        };
        log::debug!("[mock] publish {} ({} bytes)", message.topic, message.payload.len());
        self.published.lock().unwrap().push(message);
        Ok(())
    }

    pub async fn subscribe<S: Into<String>>(&self, topic: S, _qos: QoS) -> anyhow::Result<()> {
        self.subscriptions.lock().unwrap().push(topic.into());
        Ok(())
    }

    /// Injects a message as if the broker had delivered it.
    pub fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> anyhow::Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = RecordedMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };
        if let Some(tx) = self.incoming.lock().unwrap().as_ref() {
            tx.send(message)
                .map_err(|e| anyhow::anyhow!("receiver dropped: {e}"))?;
        }
        Ok(())
    }

    pub fn published_on(&self, topic: &str) -> Vec<RecordedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// The most recent payload on `topic`, parsed as JSON.
    pub fn last_json_on(&self, topic: &str) -> Option<Value> {
        self.last_message_on(topic)
    }

    /// The most recent payload on `topic`, deserialized into `T`.
    pub fn last_message_on<T: DeserializeOwned>(&self, topic: &str) -> Option<T> {
        self.published_on(topic)
            .last()
            .and_then(|m| serde_json::from_slice(&m.payload).ok())
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
    }
}

/// Builders for the Pulse telemetry wire messages.
pub struct PulseMessageBuilder;

impl PulseMessageBuilder {
    /// A `pulse/plc/sample@v1` payload with the given coil value,
    /// timestamped now.
    pub fn sample_v1(value: bool) -> Value {
        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "value": value,
        })
    }

    /// A sample with an explicit timestamp, for deterministic tests.
    pub fn sample_v1_at(timestamp: &str, value: bool) -> Value {
        json!({
            "timestamp": timestamp,
            "value": value,
        })
    }

    /// A `pulse/plc/status@v1` payload.
    pub fn status_v1(status: &str) -> Value {
        json!({ "status": status })
    }
}
