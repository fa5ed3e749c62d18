use serde::{Deserialize, Serialize};

/// One reading of the monitored coil, as produced by the telemetry source
/// and as persisted under `telemetry/latest` and `telemetry/history/*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// ISO-8601 instant assigned by the source when the coil was read.
    pub timestamp: String,
    /// Coil state at that instant.
    pub value: bool,
}

/// Incoming `pulse/plc/status@v1` message: the source's view of its own
/// connection to the controller.
#[derive(Debug, Deserialize)]
pub struct PlcStatusIn {
    pub status: String, // connecting, connected, disconnected
}
