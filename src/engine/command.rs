//! Method-channel command surface.
//!
//! Host calls arrive as `(method, arguments)` with JSON-like arguments.
//! They are parsed into a typed [`Command`] before anything touches the
//! engine, so malformed input never reaches the audio path.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::{clock::validate_bpm, DEFAULT_BPM};
use crate::error::{CommandError, ErrorCode};

/// How missing arguments are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgumentPolicy {
    /// Missing arguments are `INVALID_ARGS`.
    #[default]
    Strict,
    /// Missing arguments fall back to defaults with a warning.
    /// Wrongly typed or out-of-range values are still rejected.
    Lenient,
}

impl ArgumentPolicy {
    pub fn from_lenient_flag(lenient: bool) -> Self {
        if lenient {
            ArgumentPolicy::Lenient
        } else {
            ArgumentPolicy::Strict
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Initialize,
    Start { bpm: f64, vibrate: bool },
    Stop,
    SetTempo { bpm: f64 },
    SetVibration { enabled: bool },
    /// Host detached: stop and release the device.
    Dispose,
}

impl Command {
    pub fn parse(method: &str, args: &Value, policy: ArgumentPolicy) -> Result<Self, CommandError> {
        match method {
            "initialize" => Ok(Command::Initialize),
            "start" => Ok(Command::Start {
                bpm: read_bpm(args, policy)?,
                vibrate: read_bool(args, "vibrate", true, policy)?,
            }),
            "stop" => Ok(Command::Stop),
            "setTempo" => Ok(Command::SetTempo {
                bpm: read_bpm(args, policy)?,
            }),
            "setVibration" => Ok(Command::SetVibration {
                enabled: read_bool(args, "enabled", true, policy)?,
            }),
            "dispose" => Ok(Command::Dispose),
            other => Err(CommandError::NotImplemented {
                method: other.to_string(),
            }),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Command::Initialize => "initialize",
            Command::Start { .. } => "start",
            Command::Stop => "stop",
            Command::SetTempo { .. } => "setTempo",
            Command::SetVibration { .. } => "setVibration",
            Command::Dispose => "dispose",
        }
    }
}

fn field<'a>(args: &'a Value, name: &str) -> Option<&'a Value> {
    args.get(name).filter(|value| !value.is_null())
}

fn read_bpm(args: &Value, policy: ArgumentPolicy) -> Result<f64, CommandError> {
    let bpm = match field(args, "bpm") {
        Some(value) => value
            .as_f64()
            .ok_or_else(|| CommandError::invalid("bpm", "expected a number"))?,
        None if policy == ArgumentPolicy::Lenient => {
            log::warn!("[Command] Missing 'bpm', defaulting to {}", DEFAULT_BPM);
            DEFAULT_BPM
        }
        None => return Err(CommandError::invalid("bpm", "missing required argument")),
    };

    validate_bpm(bpm).map_err(CommandError::from)
}

fn read_bool(
    args: &Value,
    name: &str,
    default: bool,
    policy: ArgumentPolicy,
) -> Result<bool, CommandError> {
    match field(args, name) {
        Some(value) => value
            .as_bool()
            .ok_or_else(|| CommandError::invalid(name, "expected a boolean")),
        None if policy == ArgumentPolicy::Lenient => {
            log::warn!("[Command] Missing '{}', defaulting to {}", name, default);
            Ok(default)
        }
        None => Err(CommandError::invalid(name, "missing required argument")),
    }
}

/// Error payload of a failed method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodError {
    /// Channel code: INVALID_ARGS, DEVICE_UNAVAILABLE, NOT_IMPLEMENTED, ENGINE_ERROR
    pub code: String,
    pub message: String,
    pub numeric_code: i32,
}

/// Serializable result of a method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MethodError>,
}

impl MethodResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn from_error(err: &CommandError) -> Self {
        Self {
            success: false,
            error: Some(MethodError {
                code: err.channel_code().to_string(),
                message: err.message(),
                numeric_code: err.code(),
            }),
        }
    }

    pub fn from_result(result: &Result<(), CommandError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(err) => Self::from_error(err),
        }
    }

    /// Channel code of the failure, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}
