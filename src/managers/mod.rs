// Managers Module
//
// Focused managers owned by the EngineHandle, one concern each:
// - AudioEngineManager: output device, render path and event dispatcher lifecycle
// - BroadcastChannelManager: tokio broadcast channels for beat and haptic events

pub mod audio_engine_manager;
pub mod broadcast_manager;

pub use audio_engine_manager::{AudioEngineManager, SessionInfo};
pub use broadcast_manager::BroadcastChannelManager;
