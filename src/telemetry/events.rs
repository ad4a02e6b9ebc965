//! Telemetry event types describing engine health for the CLI and
//! flutter_rust_bridge streams.

use serde::{Deserialize, Serialize};

/// Lifecycle stages reported by the engine facade and JNI hooks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    LibraryLoaded,
    ContextInitialized,
    DeviceOpened,
    Started,
    Stopped,
    DeviceClosed,
}

/// Diagnostic error codes surfaced via telemetry metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    DeviceUnavailable,
    StreamFailure,
    LockPoisoned,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    /// Rolling delivery lateness of beats relative to their boundary.
    BeatLateness {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    /// Boundaries that elapsed without a beat because a check-in was late.
    SkippedBeats { count: u64, beat_count: u64 },
    /// Events dropped by the real-time side because the queue was full.
    /// `dropped_total` counts drops across every stream since process start.
    QueueOverflow { dropped: u64, dropped_total: u64 },
    Lifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
    Error {
        code: DiagnosticError,
        context: String,
    },
}
