// AudioEngineManager: output device and render session lifecycle
//
// Single Responsibility: open/close the backend, build the click for the
// negotiated rate, wire the render path and own the event dispatcher.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::audio::{
    event_queue, ClickVoice, ClickWaveform, ClockDomain, ContinuousRenderer, EventDispatcher,
    EventSinks, AudioRender, SharedState, VoiceTrigger,
};
use crate::config::{AppConfig, RenderMode};
use crate::engine::backend::{AudioBackend, StreamFormat};
use crate::error::{log_audio_error, AudioError};

/// Resources that live between `initialize` and teardown.
struct AudioSession {
    format: StreamFormat,
    mode: RenderMode,
    click: ClickWaveform,
    voice: Option<VoiceTrigger>,
    dispatcher: EventDispatcher,
}

/// Read-only description of the active session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub backend: &'static str,
    pub format: StreamFormat,
    pub mode: RenderMode,
    pub click_samples: usize,
}

/// Manages the output device and everything attached to it
///
/// Lock order: session, then backend, then the shared metronome state.
/// The state lock is never held while the backend opens or closes a
/// stream, because stream teardown waits for an in-flight render callback.
pub struct AudioEngineManager {
    backend: Mutex<Box<dyn AudioBackend>>,
    session: Mutex<Option<AudioSession>>,
}

impl AudioEngineManager {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
            session: Mutex::new(None),
        }
    }

    /// Open the device and start the render path.
    ///
    /// Idempotent: returns `Ok(false)` without touching the device when a
    /// session already exists.
    pub fn initialize(
        &self,
        state: &SharedState,
        config: &AppConfig,
        sinks: EventSinks,
    ) -> Result<bool, AudioError> {
        let mut session = self.lock_session()?;
        if session.is_some() {
            return Ok(false);
        }

        let mut backend = self.lock_backend()?;
        let format = backend
            .open(config.audio.preferred_sample_rate)
            .inspect_err(|err| log_audio_error(err, "open_device"))?;

        let mode = if backend.supports_sample_accurate() {
            config.audio.mode
        } else {
            if config.audio.mode == RenderMode::Continuous {
                log::info!(
                    "[AudioEngineManager] Backend '{}' has no sample clock, using discrete mode",
                    backend.name()
                );
            }
            RenderMode::Discrete
        };

        let click = ClickWaveform::new(format.sample_rate, &config.click);
        let (publisher, queue) = event_queue(config.audio.event_queue_capacity);
        let dispatcher = match EventDispatcher::spawn(queue, sinks) {
            Ok(dispatcher) => dispatcher,
            Err(err) => {
                backend.close();
                return Err(err);
            }
        };

        {
            let mut guard = Self::lock_state(state)?;
            let domain = match mode {
                RenderMode::Continuous => ClockDomain::Samples {
                    sample_rate: format.sample_rate as f64,
                },
                RenderMode::Discrete => ClockDomain::Time,
            };
            guard.clock.set_domain(domain);
            guard.haptic_pulse_ms = config.audio.haptic_pulse_ms;
            guard.sample_time = 0;
            guard.attach_events(publisher);
        }

        let (renderer, voice): (Box<dyn AudioRender>, Option<VoiceTrigger>) = match mode {
            RenderMode::Continuous => (
                Box::new(ContinuousRenderer::new(state.clone(), click.clone())),
                None,
            ),
            RenderMode::Discrete => {
                let (voice, trigger) = ClickVoice::new(click.clone());
                (Box::new(voice), Some(trigger))
            }
        };

        if let Err(err) = backend.play(renderer) {
            log_audio_error(&err, "start_stream");
            backend.close();
            if let Ok(mut guard) = state.lock() {
                guard.detach_events();
            }
            return Err(err);
        }

        log::info!(
            "[AudioEngineManager] Output ready: backend={}, rate={} Hz, channels={}, mode={:?}, click={} samples",
            backend.name(),
            format.sample_rate,
            format.channels,
            mode,
            click.len()
        );

        *session = Some(AudioSession {
            format,
            mode,
            click,
            voice,
            dispatcher,
        });
        Ok(true)
    }

    /// Close the device, detach the event queue and join the dispatcher.
    ///
    /// Returns `false` when there was nothing to tear down.
    pub fn teardown(&self, state: &SharedState) -> Result<bool, AudioError> {
        let mut session = self.lock_session()?;
        let Some(mut active) = session.take() else {
            return Ok(false);
        };

        self.lock_backend()?.close();
        if let Ok(mut guard) = state.lock() {
            guard.detach_events();
        }
        active.dispatcher.shutdown();
        Ok(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.session
            .lock()
            .map(|session| session.is_some())
            .unwrap_or(false)
    }

    pub fn mode(&self) -> Result<Option<RenderMode>, AudioError> {
        Ok(self.lock_session()?.as_ref().map(|s| s.mode))
    }

    pub fn voice(&self) -> Result<Option<VoiceTrigger>, AudioError> {
        Ok(self
            .lock_session()?
            .as_ref()
            .and_then(|s| s.voice.clone()))
    }

    pub fn session_info(&self) -> Result<Option<SessionInfo>, AudioError> {
        let session = self.lock_session()?;
        let backend = self.lock_backend()?;
        Ok(session.as_ref().map(|s| SessionInfo {
            backend: backend.name(),
            format: s.format,
            mode: s.mode,
            click_samples: s.click.len(),
        }))
    }

    // ========================================================================
    // LOCK HELPERS
    // ========================================================================

    fn lock_session(&self) -> Result<MutexGuard<'_, Option<AudioSession>>, AudioError> {
        self.session.lock().map_err(|_| AudioError::LockPoisoned {
            component: "audio_session".to_string(),
        })
    }

    fn lock_backend(&self) -> Result<MutexGuard<'_, Box<dyn AudioBackend>>, AudioError> {
        self.backend.lock().map_err(|_| AudioError::LockPoisoned {
            component: "audio_backend".to_string(),
        })
    }

    fn lock_state(
        state: &SharedState,
    ) -> Result<MutexGuard<'_, crate::audio::MetronomeState>, AudioError> {
        state.lock().map_err(|_| AudioError::LockPoisoned {
            component: "metronome_state".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MetronomeState;
    use crate::engine::backend::OfflineBackend;
    use tokio::sync::broadcast;

    fn sinks() -> EventSinks {
        EventSinks {
            beats: broadcast::channel(16).0,
            haptics: broadcast::channel(16).0,
        }
    }

    fn state() -> SharedState {
        MetronomeState::new(ClockDomain::Time, 15).shared()
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (backend, driver) = OfflineBackend::new(8_000);
        let manager = AudioEngineManager::new(Box::new(backend));
        let state = state();
        let config = AppConfig::default();

        assert_eq!(manager.initialize(&state, &config, sinks()), Ok(true));
        assert_eq!(manager.initialize(&state, &config, sinks()), Ok(false));
        assert!(manager.is_initialized());
        assert!(driver.is_playing());

        let info = manager.session_info().unwrap().unwrap();
        assert_eq!(info.backend, "offline");
        assert_eq!(info.format.sample_rate, 8_000);
        assert_eq!(info.mode, RenderMode::Continuous);
        assert_eq!(info.click_samples, 200);
        assert_eq!(
            state.lock().unwrap().clock.domain(),
            ClockDomain::Samples {
                sample_rate: 8_000.0
            }
        );
    }

    #[test]
    fn test_backend_without_sample_clock_forces_discrete() {
        let (backend, _driver) = OfflineBackend::new(8_000);
        let manager = AudioEngineManager::new(Box::new(backend.without_sample_clock()));
        let state = state();

        manager
            .initialize(&state, &AppConfig::default(), sinks())
            .unwrap();
        assert_eq!(manager.mode().unwrap(), Some(RenderMode::Discrete));
        assert!(manager.voice().unwrap().is_some());
        assert_eq!(state.lock().unwrap().clock.domain(), ClockDomain::Time);
    }

    #[test]
    fn test_device_failure_leaves_manager_uninitialized() {
        let (backend, _driver) = OfflineBackend::new(8_000);
        let manager = AudioEngineManager::new(Box::new(backend.unavailable("no device")));
        let state = state();

        let result = manager.initialize(&state, &AppConfig::default(), sinks());
        assert!(matches!(result, Err(AudioError::DeviceUnavailable { .. })));
        assert!(!manager.is_initialized());
        assert_eq!(manager.session_info().unwrap().map(|i| i.mode), None);
    }

    #[test]
    fn test_teardown_releases_device() {
        let (backend, driver) = OfflineBackend::new(8_000);
        let manager = AudioEngineManager::new(Box::new(backend));
        let state = state();

        manager
            .initialize(&state, &AppConfig::default(), sinks())
            .unwrap();
        assert_eq!(manager.teardown(&state), Ok(true));
        assert_eq!(manager.teardown(&state), Ok(false));
        assert!(!driver.is_playing());
        assert!(!manager.is_initialized());

        // A fresh session can be created afterwards.
        assert_eq!(
            manager.initialize(&state, &AppConfig::default(), sinks()),
            Ok(true)
        );
    }
}
