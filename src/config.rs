//! Configuration management for the metronome engine
//!
//! Click timbre, render mode, scheduler cadence and command-surface policy
//! are read from a JSON file so they can be tuned without recompiling.
//! Every field has a default, so partial files are accepted.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub click: ClickConfig,
    pub audio: AudioConfig,
    pub scheduler: SchedulerConfig,
    pub commands: CommandConfig,
}

/// Click waveform parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub duration_ms: f64,
    pub frequency_hz: f64,
    /// Peak amplitude in [0, 1]
    pub amplitude: f64,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            duration_ms: 25.0,
            frequency_hz: 900.0,
            amplitude: 0.8,
        }
    }
}

/// How beats reach the output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Output callback mixes clicks at sample-exact offsets.
    #[default]
    Continuous,
    /// Timer loop restarts a one-shot click voice on each beat.
    Discrete,
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate requested from the device; the negotiated rate wins.
    pub preferred_sample_rate: u32,
    pub mode: RenderMode,
    pub haptic_pulse_ms: u32,
    /// Capacity of the lock-free queue leaving the render domain
    pub event_queue_capacity: usize,
    /// Buffer of each host-facing broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            preferred_sample_rate: 44_100,
            mode: RenderMode::Continuous,
            haptic_pulse_ms: 15,
            event_queue_capacity: 128,
            event_channel_capacity: 256,
        }
    }
}

/// Discrete-mode timer cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_check_interval_ms: f64,
    pub min_check_interval_ms: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_check_interval_ms: 5.0,
            min_check_interval_ms: 1.0,
        }
    }
}

/// Method-channel argument handling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Substitute defaults for missing arguments instead of rejecting them.
    pub lenient_arguments: bool,
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Falls back to defaults (with a warning) when the file is missing or
    /// the JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration for the current platform
    #[cfg(target_os = "android")]
    pub fn load() -> Self {
        // Flutter assets live inside the APK and need the AssetManager.
        log::info!("[Config] Using default configuration on Android");
        Self::default()
    }

    /// Load configuration for the current platform
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/metronome_config.json")
    }
}
