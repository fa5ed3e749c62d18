//! Telemetry ingest: subscribes to the MQTT topics the controller-side
//! feed publishes on and pushes every sample through the event log
//! writer. The feed imposes its own cadence; no batching or rate limiting
//! happens here.

use crate::config::MqttConf;
use crate::eventlog::EventLogWriter;
use crate::health::HealthTracker;
use crate::models::{PlcStatusIn, TelemetrySample};
use crate::state::Shared;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const SAMPLE_TOPIC: &str = "pulse/plc/sample@v1";
pub const STATUS_TOPIC: &str = "pulse/plc/status@v1";

/// Every topic the kernel must hold a subscription to.
const INGEST_TOPICS: [&str; 2] = [SAMPLE_TOPIC, STATUS_TOPIC];

pub fn spawn_telemetry_listener(
    mqtt: MqttConf,
    writer: Arc<EventLogWriter>,
    latest: Shared<Option<TelemetrySample>>,
    health: HealthTracker,
) {
    tokio::spawn(async move {
        let mut opts = MqttOptions::new("pulse-kernel", &mqtt.host, mqtt.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    health.mark_mqtt_connected();
                    // Subscribe on every connection, not just the first:
                    // a failed subscribe gets another chance on the next
                    // ConnAck instead of leaving ingest dead.
                    if let Err(e) = subscribe_ingest_topics(&client).await {
                        warn!(error = ?e, "mqtt subscribe failed, will retry on reconnect");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    handle_publish(&publish.topic, &publish.payload, &writer, &latest, &health)
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = ?e, "mqtt connection error");
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn subscribe_ingest_topics(client: &AsyncClient) -> Result<(), rumqttc::ClientError> {
    for topic in INGEST_TOPICS {
        client.subscribe(topic, QoS::AtLeastOnce).await?;
    }
    Ok(())
}

async fn handle_publish(
    topic: &str,
    payload: &[u8],
    writer: &EventLogWriter,
    latest: &Shared<Option<TelemetrySample>>,
    health: &HealthTracker,
) {
    match topic {
        SAMPLE_TOPIC => match serde_json::from_slice::<TelemetrySample>(payload) {
            Ok(sample) => {
                *latest.lock() = Some(sample.clone());
                health.note_sample();
                writer.record(&sample).await;
            }
            Err(e) => warn!(error = %e, "invalid telemetry sample payload"),
        },
        STATUS_TOPIC => match serde_json::from_slice::<PlcStatusIn>(payload) {
            Ok(status) => health.set_plc_status(&status.status),
            Err(e) => warn!(error = %e, "invalid plc status payload"),
        },
        other => warn!(topic = other, "unexpected topic"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::LATEST_PATH;
    use crate::presence::PresenceBroadcaster;
    use crate::state::new_shared;
    use crate::store::{DurableStore, MemoryStore};

    #[tokio::test]
    async fn sample_publish_updates_latest_cell_and_event_log() {
        let store = Arc::new(MemoryStore::new());
        let writer = EventLogWriter::new(Some(store.clone()));
        let latest = new_shared(None);
        let health = HealthTracker::new();

        let payload = br#"{"timestamp":"2024-05-01T08:00:00Z","value":true}"#;
        handle_publish(SAMPLE_TOPIC, payload, &writer, &latest, &health).await;

        assert_eq!(
            latest.lock().as_ref().unwrap().timestamp,
            "2024-05-01T08:00:00Z"
        );
        let persisted = store.read(LATEST_PATH).await.unwrap().unwrap();
        assert_eq!(persisted["value"], true);
        assert_eq!(health.snapshot(&PresenceBroadcaster::new()).samples_recorded, 1);
    }

    #[tokio::test]
    async fn status_publish_updates_health_only() {
        let writer = EventLogWriter::new(None);
        let latest = new_shared(None);
        let health = HealthTracker::new();

        handle_publish(
            STATUS_TOPIC,
            br#"{"status":"disconnected"}"#,
            &writer,
            &latest,
            &health,
        )
        .await;

        assert!(latest.lock().is_none());
        assert_eq!(
            health.snapshot(&PresenceBroadcaster::new()).plc_status,
            "disconnected"
        );
    }

    #[test]
    fn ingest_covers_both_wire_topics() {
        // Resubscription on ConnAck walks this list; both contracts must
        // stay on it.
        assert!(INGEST_TOPICS.contains(&SAMPLE_TOPIC));
        assert!(INGEST_TOPICS.contains(&STATUS_TOPIC));
    }

    #[tokio::test]
    async fn garbage_payloads_are_dropped() {
        let writer = EventLogWriter::new(None);
        let latest = new_shared(None);
        let health = HealthTracker::new();

        handle_publish(SAMPLE_TOPIC, b"not json", &writer, &latest, &health).await;
        handle_publish(STATUS_TOPIC, b"{}", &writer, &latest, &health).await;

        assert!(latest.lock().is_none());
        let snap = health.snapshot(&PresenceBroadcaster::new());
        assert_eq!(snap.samples_recorded, 0);
        assert_eq!(snap.plc_status, "unknown");
    }
}
