// Public API for flutter_rust_bridge integration
// This module provides FFI functions for the host app to drive the metronome engine

#![allow(dead_code)] // FFI functions are called from Dart, not detected by Rust analyzer

use anyhow::Result;
use once_cell::sync::Lazy;

use crate::engine::{EngineHandle, MethodResponse};
use crate::error::{AudioError, CommandError};

mod diagnostics;
mod streams;
mod types;

pub use diagnostics::*;
pub use streams::*;
pub use types::*;

// Re-export error code constants for FFI exposure
pub use crate::error::{AudioErrorCodes, CommandErrorCodes};

/// Global engine instance
///
/// Created on first use with the platform output backend and the bundled
/// configuration. The output device is not touched until `initialize` or
/// `start` is called.
pub(crate) static ENGINE: Lazy<EngineHandle> = Lazy::new(|| {
    crate::init_logging();
    EngineHandle::new()
});

/// Method channel the host plugin registers for engine commands.
pub const METHOD_CHANNEL: &str = "com.example.native_metronome";

/// Name of the host method channel, for diagnostics
#[flutter_rust_bridge::frb(sync)]
pub fn get_channel_name() -> String {
    METHOD_CHANNEL.to_string()
}

/// Get the version of the metronome engine
#[flutter_rust_bridge::frb(sync)]
pub fn get_version() -> Result<String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

/// Open the output device and build the click
///
/// Idempotent. Calling `start` without `initialize` initializes implicitly.
///
/// # Errors
/// - No output device, or the stream could not be opened
/// - Lock poisoning on engine state
#[flutter_rust_bridge::frb(sync)]
pub fn initialize() -> Result<(), AudioError> {
    ENGINE.initialize()
}

/// Start the metronome
///
/// The first beat sounds immediately. A no-op while already running.
///
/// # Arguments
/// * `bpm` - Beats per minute, finite, above 0 and at most 1000
/// * `vibrate` - Emit a haptic pulse with each beat
#[flutter_rust_bridge::frb(sync)]
pub fn start(bpm: f64, vibrate: bool) -> Result<(), AudioError> {
    ENGINE.start(bpm, vibrate)
}

/// Stop the metronome. Safe to call when not running.
#[flutter_rust_bridge::frb(sync)]
pub fn stop() -> Result<(), AudioError> {
    ENGINE.stop()
}

/// Change tempo. Applies from the next beat; no beat is dropped or repeated.
#[flutter_rust_bridge::frb(sync)]
pub fn set_tempo(bpm: f64) -> Result<(), AudioError> {
    ENGINE.set_tempo(bpm)
}

#[flutter_rust_bridge::frb(sync)]
pub fn set_vibration(enabled: bool) -> Result<(), AudioError> {
    ENGINE.set_vibration(enabled)
}

/// Stop and release the output device
///
/// Call when the host detaches. The engine can be initialized again later.
#[flutter_rust_bridge::frb(sync)]
pub fn dispose() -> Result<(), AudioError> {
    ENGINE.shutdown()
}

/// Dispatch a method-channel call
///
/// `arguments_json` is the JSON encoding of the argument map (or `null`).
/// Failures are reported in the response, never as a panic.
#[flutter_rust_bridge::frb(sync)]
pub fn handle_method_call(method: String, arguments_json: String) -> MethodResponse {
    dispatch_method_call(&ENGINE, &method, &arguments_json)
}

pub(crate) fn dispatch_method_call(
    engine: &EngineHandle,
    method: &str,
    arguments_json: &str,
) -> MethodResponse {
    let raw = arguments_json.trim();
    let arguments = if raw.is_empty() {
        serde_json::Value::Null
    } else {
        match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                let err = CommandError::invalid("arguments", format!("malformed JSON: {}", err));
                crate::error::log_command_error(&err, method);
                return MethodResponse::from_error(&err);
            }
        }
    };
    engine.handle_method_call(method, &arguments)
}

/// Get AudioErrorCodes as a structured object with all error code constants
#[flutter_rust_bridge::frb(sync)]
pub fn get_audio_error_codes() -> AudioErrorCodes {
    AudioErrorCodes {}
}

/// Get CommandErrorCodes as a structured object with all error code constants
#[flutter_rust_bridge::frb(sync)]
pub fn get_command_error_codes() -> CommandErrorCodes {
    CommandErrorCodes {}
}
