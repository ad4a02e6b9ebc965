//! Backend abstractions for the metronome engine.
//!
//! An [`AudioBackend`] owns one output stream and drives an
//! [`AudioRender`] callback from it. The engine never talks to a device
//! API directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::audio::AudioRender;
use crate::error::AudioError;

/// Format negotiated with the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Trait implemented by platform-specific audio backends.
///
/// Lifecycle: `open` negotiates the format, `play` starts a stream that
/// calls the renderer until `close`. `close` must be safe to call twice.
pub trait AudioBackend: Send {
    fn open(&mut self, preferred_sample_rate: u32) -> Result<StreamFormat, AudioError>;
    fn play(&mut self, renderer: Box<dyn AudioRender>) -> Result<(), AudioError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;

    /// Whether the callback runs at a steady cadence suitable for the
    /// sample-domain clock. Backends returning `false` force discrete mode.
    fn supports_sample_accurate(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Monotonic clock used by the discrete scheduler.
pub trait TimeSource: Send + Sync {
    /// Seconds since an arbitrary fixed epoch.
    fn now_secs(&self) -> f64;
}

/// Default time source backed by `Instant`.
pub struct SystemTimeSource {
    epoch: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Manually advanced time source for deterministic tests.
#[derive(Default)]
pub struct ManualTimeSource {
    nanos: AtomicU64,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set_secs(&self, secs: f64) {
        self.nanos
            .store((secs.max(0.0) * 1e9).round() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_secs(&self) -> f64 {
        self.nanos.load(Ordering::SeqCst) as f64 / 1e9
    }
}

#[cfg(target_os = "android")]
mod oboe;
#[cfg(target_os = "android")]
pub use oboe::OboeBackend;

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use cpal::CpalBackend;

mod offline;
pub use offline::{OfflineBackend, OfflineDriver};

/// Backend for the current platform's default output device.
pub fn platform_backend() -> Box<dyn AudioBackend> {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "android")] {
            Box::new(OboeBackend::new())
        } else {
            Box::new(CpalBackend::new())
        }
    }
}
