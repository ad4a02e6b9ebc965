use futures::Stream;

use crate::telemetry::{self, MetricEvent};

use super::{BeatEvent, HapticPulse, ENGINE};

/// Stream of beat notifications
///
/// Yields one `BeatEvent` per beat, in beat order, for as long as the
/// subscriber keeps up. A subscriber that falls behind skips the events it
/// missed rather than blocking the engine.
#[flutter_rust_bridge::frb(ignore)]
pub async fn beat_stream() -> impl Stream<Item = BeatEvent> {
    ENGINE.beat_stream()
}

/// Stream of haptic pulse requests, one per beat while vibration is on.
#[flutter_rust_bridge::frb(ignore)]
pub async fn haptic_stream() -> impl Stream<Item = HapticPulse> {
    ENGINE.haptic_stream()
}

/// Stream of diagnostic metrics aggregated by the telemetry hub.
#[flutter_rust_bridge::frb(ignore)]
pub async fn diagnostic_metrics_stream() -> impl Stream<Item = MetricEvent> {
    use futures::StreamExt;
    use tokio_stream::wrappers::BroadcastStream;

    BroadcastStream::new(telemetry::hub().collector().subscribe())
        .filter_map(|item| async move { item.ok() })
}
