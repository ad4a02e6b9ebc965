use serde::{Deserialize, Serialize};

/// Beat notification delivered to the host once per beat, in beat order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatEvent {
    /// 1-based running count since the last start. Optional on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat_count: Option<u64>,
    /// Wall-clock milliseconds since the Unix epoch at delivery.
    pub timestamp_millis: u64,
    pub current_bpm: f64,
}

/// Request for the host to perform a short vibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HapticPulse {
    pub duration_ms: u32,
}
