// Audio module - click synthesis, beat timing and real-time rendering

pub mod clock;
pub mod dispatch;
pub mod metronome;
pub mod renderer;
pub mod scheduler;

// Re-export commonly used types for convenience
pub use clock::{BeatClock, BeatTick, ClockDomain, ClockSnapshot, DEFAULT_BPM, MAX_BPM};
pub use dispatch::{event_queue, EngineEvent, EventDispatcher, EventPublisher, EventSinks};
pub use metronome::{generate_click_waveform, ClickWaveform};
pub use renderer::{
    AudioRender, ClickVoice, ContinuousRenderer, MetronomeState, SharedState, VoiceTrigger,
};
pub use scheduler::BeatScheduler;
