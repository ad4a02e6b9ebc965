// Audio error types and constants

use crate::audio::MAX_BPM;
use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Audio error code constants exposed to Dart via FFI
///
/// Error code range: 1001-1008
#[frb(unignore)]
pub struct AudioErrorCodes {}

#[frb]
impl AudioErrorCodes {
    /// BPM value is invalid (must be finite and > 0)
    pub const BPM_INVALID: i32 = 1001;

    /// Metronome is already running
    pub const ALREADY_RUNNING: i32 = 1002;

    /// Metronome is not running
    pub const NOT_RUNNING: i32 = 1003;

    /// No usable audio output device
    pub const DEVICE_UNAVAILABLE: i32 = 1004;

    /// Failed to open audio stream
    pub const STREAM_OPEN_FAILED: i32 = 1005;

    /// Hardware error occurred while starting/stopping a stream
    pub const HARDWARE_ERROR: i32 = 1006;

    /// Mutex was poisoned
    pub const LOCK_POISONED: i32 = 1007;

    /// Operation requires an initialized engine
    pub const NOT_INITIALIZED: i32 = 1008;

    /// Get BPM_INVALID error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn bpm_invalid() -> i32 {
        Self::BPM_INVALID
    }

    /// Get ALREADY_RUNNING error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn already_running() -> i32 {
        Self::ALREADY_RUNNING
    }

    /// Get NOT_RUNNING error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_running() -> i32 {
        Self::NOT_RUNNING
    }

    /// Get DEVICE_UNAVAILABLE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn device_unavailable() -> i32 {
        Self::DEVICE_UNAVAILABLE
    }

    /// Get STREAM_OPEN_FAILED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn stream_open_failed() -> i32 {
        Self::STREAM_OPEN_FAILED
    }

    /// Get HARDWARE_ERROR error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn hardware_error() -> i32 {
        Self::HARDWARE_ERROR
    }

    /// Get LOCK_POISONED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn lock_poisoned() -> i32 {
        Self::LOCK_POISONED
    }

    /// Get NOT_INITIALIZED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_initialized() -> i32 {
        Self::NOT_INITIALIZED
    }
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=MetronomeEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover tempo validation, device access and stream management.
/// `AlreadyRunning` and `NotRunning` are benign: the facade treats them as
/// no-ops and only backends report them.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// BPM value is invalid (must be finite and > 0)
    BpmInvalid { bpm: f64 },

    /// Metronome or stream is already running
    AlreadyRunning,

    /// Metronome or stream is not running
    NotRunning,

    /// No usable output device could be found
    DeviceUnavailable { reason: String },

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// Mutex was poisoned
    LockPoisoned { component: String },

    /// Engine has not been initialized
    NotInitialized,
}

impl AudioError {
    /// True for errors that mean "the device could not be used".
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            AudioError::DeviceUnavailable { .. }
                | AudioError::StreamOpenFailed { .. }
                | AudioError::HardwareError { .. }
        )
    }
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::BpmInvalid { .. } => AudioErrorCodes::BPM_INVALID,
            AudioError::AlreadyRunning => AudioErrorCodes::ALREADY_RUNNING,
            AudioError::NotRunning => AudioErrorCodes::NOT_RUNNING,
            AudioError::DeviceUnavailable { .. } => AudioErrorCodes::DEVICE_UNAVAILABLE,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::NotInitialized => AudioErrorCodes::NOT_INITIALIZED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::BpmInvalid { bpm } => {
                format!("BPM must be finite, above 0 and at most {} (got {})", MAX_BPM, bpm)
            }
            AudioError::AlreadyRunning => "Metronome already running".to_string(),
            AudioError::NotRunning => "Metronome not running".to_string(),
            AudioError::DeviceUnavailable { reason } => {
                format!("Audio output device unavailable: {}", reason)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::NotInitialized => {
                "Engine not initialized. Call initialize() first.".to_string()
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}
