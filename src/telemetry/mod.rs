//! Metronome telemetry.
//!
//! Beat lateness, skipped beats, dropped events and lifecycle phases are
//! published to one process-wide hub. Consumers either subscribe to the
//! broadcast stream or read a snapshot of the recent history.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

pub mod events;

pub use events::{DiagnosticError, LifecyclePhase, MetricEvent};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Recent history and counters, as returned to the host and the CLI.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Fan-out of metric events plus the most recent ones for snapshots.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    recent: Mutex<VecDeque<MetricEvent>>,
    keep: usize,
    published: AtomicU64,
    evicted: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(buffer.max(1)).0,
            recent: Mutex::new(VecDeque::with_capacity(history_capacity)),
            keep: history_capacity.max(1),
            published: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Append to history and broadcast. Never blocks on subscribers.
    pub fn publish(&self, event: MetricEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.push_back(event.clone());
        while recent.len() > self.keep {
            recent.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        drop(recent);

        // No receivers is fine: history still has the event.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        TelemetrySnapshot {
            recent: recent.iter().cloned().collect(),
            total_events: self.published.load(Ordering::Relaxed),
            dropped_events: self.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Absolute lateness of the last few beats, in milliseconds.
struct LatenessWindow {
    values: VecDeque<f32>,
    len: usize,
}

impl LatenessWindow {
    fn new(len: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(len),
            len: len.max(1),
        }
    }

    /// Push a value and return `(avg, max, count)` over the window.
    fn push(&mut self, lateness_ms: f32) -> (f32, f32, usize) {
        if self.values.len() == self.len {
            self.values.pop_front();
        }
        self.values.push_back(lateness_ms.abs());

        let (sum, max) = self
            .values
            .iter()
            .fold((0.0_f32, 0.0_f32), |(sum, max), v| (sum + v, max.max(*v)));
        let count = self.values.len();
        (sum / count as f32, max, count)
    }
}

/// Turns a queue's running drop count into per-report increments.
#[derive(Debug, Default)]
pub struct OverflowTracker {
    reported: u64,
}

impl OverflowTracker {
    /// Drops not yet reported, given the queue's running count.
    pub fn take_new(&mut self, dropped: u64) -> u64 {
        let new = dropped.saturating_sub(self.reported);
        self.reported = self.reported.max(dropped);
        new
    }
}

/// Collector plus the derived gauges the engine reports through it.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    lateness: Mutex<LatenessWindow>,
    overflow_total: AtomicU64,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, lateness_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            lateness: Mutex::new(LatenessWindow::new(lateness_window)),
            overflow_total: AtomicU64::new(0),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    /// Record how late a beat was delivered relative to its boundary.
    pub fn record_beat_lateness(&self, lateness_ms: f32) {
        let (avg, max, count) = self
            .lateness
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(lateness_ms);

        self.collector.publish(MetricEvent::BeatLateness {
            avg_ms: avg,
            max_ms: max,
            sample_count: count,
        });
    }

    pub fn record_skipped_beats(&self, count: u64, beat_count: u64) {
        if count == 0 {
            return;
        }
        self.collector
            .publish(MetricEvent::SkippedBeats { count, beat_count });
    }

    /// Record events one queue dropped since its previous report.
    pub fn record_queue_overflow(&self, dropped: u64) {
        if dropped == 0 {
            return;
        }
        let dropped_total = self.overflow_total.fetch_add(dropped, Ordering::Relaxed) + dropped;
        self.collector.publish(MetricEvent::QueueOverflow {
            dropped,
            dropped_total,
        });
    }

    pub fn record_lifecycle(&self, phase: LifecyclePhase) {
        self.collector.publish(MetricEvent::Lifecycle {
            phase,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_error(&self, code: DiagnosticError, context: impl Into<String>) {
        self.collector.publish(MetricEvent::Error {
            code,
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

pub(crate) fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
