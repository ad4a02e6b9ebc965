//! Engine module housing the metronome core.
//!
//! `backend` abstracts the output device, `command` parses host method
//! calls and `core` exposes the `EngineHandle` facade tying them together.

pub mod backend;
pub mod command;
pub mod core;

#[cfg(target_os = "android")]
pub use backend::OboeBackend;
#[cfg(not(target_os = "android"))]
pub use backend::CpalBackend;
pub use backend::{
    platform_backend, AudioBackend, ManualTimeSource, OfflineBackend, OfflineDriver,
    StreamFormat, SystemTimeSource, TimeSource,
};
pub use command::{ArgumentPolicy, Command, MethodError, MethodResponse};
pub use core::{EngineHandle, EngineSnapshot};
