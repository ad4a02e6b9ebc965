// Command (method-channel) error types and constants

use crate::audio::MAX_BPM;
use crate::error::{AudioError, ErrorCode};
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Command error code constants exposed to Dart via FFI
///
/// Error code range: 3001-3003
#[frb(unignore)]
pub struct CommandErrorCodes {}

#[frb]
impl CommandErrorCodes {
    /// A required argument is missing or malformed
    pub const INVALID_ARGUMENT: i32 = 3001;

    /// The method name is not part of the command surface
    pub const NOT_IMPLEMENTED: i32 = 3002;

    /// The engine rejected the command (wraps an audio error)
    pub const ENGINE_FAILURE: i32 = 3003;

    /// Get INVALID_ARGUMENT error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_argument() -> i32 {
        Self::INVALID_ARGUMENT
    }

    /// Get NOT_IMPLEMENTED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_implemented() -> i32 {
        Self::NOT_IMPLEMENTED
    }

    /// Get ENGINE_FAILURE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn engine_failure() -> i32 {
        Self::ENGINE_FAILURE
    }
}

/// Log a command error with structured context
pub fn log_command_error(err: &CommandError, context: &str) {
    error!(
        "Command error in {}: code={}, component=CommandSurface, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors surfaced synchronously to the host for a single command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Argument missing, wrongly typed or out of range
    InvalidArgument { field: String, reason: String },

    /// Unknown method name
    NotImplemented { method: String },

    /// Engine-level failure (device unavailable, lock poisoned, ...)
    Engine(AudioError),
}

impl CommandError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        CommandError::InvalidArgument {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Short error code string used on the method channel.
    pub fn channel_code(&self) -> &'static str {
        match self {
            CommandError::InvalidArgument { .. } => "INVALID_ARGS",
            CommandError::NotImplemented { .. } => "NOT_IMPLEMENTED",
            CommandError::Engine(err) if err.is_device_failure() => "DEVICE_UNAVAILABLE",
            CommandError::Engine(_) => "ENGINE_ERROR",
        }
    }
}

impl From<AudioError> for CommandError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::BpmInvalid { bpm } => CommandError::InvalidArgument {
                field: "bpm".to_string(),
                reason: format!(
                    "must be finite, above 0 and at most {} (got {})",
                    MAX_BPM, bpm
                ),
            },
            other => CommandError::Engine(other),
        }
    }
}

impl ErrorCode for CommandError {
    fn code(&self) -> i32 {
        match self {
            CommandError::InvalidArgument { .. } => CommandErrorCodes::INVALID_ARGUMENT,
            CommandError::NotImplemented { .. } => CommandErrorCodes::NOT_IMPLEMENTED,
            CommandError::Engine(_) => CommandErrorCodes::ENGINE_FAILURE,
        }
    }

    fn message(&self) -> String {
        match self {
            CommandError::InvalidArgument { field, reason } => {
                format!("Invalid argument '{}': {}", field, reason)
            }
            CommandError::NotImplemented { method } => {
                format!("Method '{}' is not implemented", method)
            }
            CommandError::Engine(err) => err.message(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CommandError::{} (code {}): {}",
            self.channel_code(),
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Engine(err) => Some(err),
            _ => None,
        }
    }
}
