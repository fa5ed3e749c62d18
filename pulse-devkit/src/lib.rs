/*!
# Pulse DevKit

Utilities for developing and testing the Pulse kernel without real
hardware or external services:
- A mock MQTT client that records publishes and can replay incoming
  messages for assertions.
- Builders for the telemetry wire messages.
- A feed simulator that publishes synthetic coil samples against a real
  broker, standing in for the controller-side backend.
*/

pub mod feed;
pub mod mqtt_stub;

pub use feed::{FeedConfig, FeedSimulator};
pub use mqtt_stub::{MockMqttClient, PulseMessageBuilder};

/// Topic carrying `{"timestamp": ..., "value": ...}` coil samples.
pub const SAMPLE_TOPIC: &str = "pulse/plc/sample@v1";
/// Topic carrying the feed's own controller connection status.
pub const STATUS_TOPIC: &str = "pulse/plc/status@v1";
