use crate::error::AudioError;
use crate::telemetry::{self, TelemetrySnapshot};

use super::ENGINE;

/// Recent telemetry history and counters.
#[flutter_rust_bridge::frb(sync)]
pub fn telemetry_snapshot() -> TelemetrySnapshot {
    telemetry::hub().snapshot()
}

/// Clock, vibration flag and output session as a JSON document.
#[flutter_rust_bridge::frb(sync)]
pub fn engine_snapshot_json() -> Result<String, AudioError> {
    let snapshot = ENGINE.snapshot()?;
    serde_json::to_string(&snapshot).map_err(|err| AudioError::HardwareError {
        details: format!("failed to encode engine snapshot: {}", err),
    })
}
