//! EngineHandle: the metronome engine facade.
//!
//! Coordinates the beat clock, the output session and the host-facing
//! channels behind five synchronous operations (initialize, start, stop,
//! set_tempo, set_vibration) plus teardown. Commands are expected one at a
//! time from the host; the shared state lock is only held for short,
//! non-blocking sections.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::{BeatEvent, HapticPulse};
use crate::audio::clock::validate_bpm;
use crate::audio::{BeatScheduler, ClockDomain, ClockSnapshot, EventSinks, MetronomeState, SharedState};
use crate::config::{AppConfig, RenderMode};
use crate::engine::backend::{platform_backend, AudioBackend, SystemTimeSource, TimeSource};
use crate::engine::command::{ArgumentPolicy, Command, MethodResponse};
use crate::error::{log_audio_error, log_command_error, AudioError, CommandError};
use crate::managers::{AudioEngineManager, BroadcastChannelManager, SessionInfo};
use crate::telemetry::{self, DiagnosticError, LifecyclePhase};

/// Point-in-time view of the engine for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub clock: ClockSnapshot,
    pub vibrate: bool,
    pub session: Option<SessionInfo>,
}

pub struct EngineHandle {
    config: AppConfig,
    state: SharedState,
    audio: AudioEngineManager,
    broadcasts: BroadcastChannelManager,
    scheduler: Mutex<Option<BeatScheduler>>,
    time_source: Arc<dyn TimeSource>,
    argument_policy: ArgumentPolicy,
}

impl EngineHandle {
    /// Create an engine for the platform's default output device.
    pub fn new() -> Self {
        Self::with_backend(AppConfig::load(), platform_backend())
    }

    pub fn with_backend(config: AppConfig, backend: Box<dyn AudioBackend>) -> Self {
        let state = MetronomeState::new(ClockDomain::Time, config.audio.haptic_pulse_ms).shared();

        let broadcasts = BroadcastChannelManager::new();
        broadcasts.init_beats(config.audio.event_channel_capacity);
        broadcasts.init_haptics(config.audio.event_channel_capacity);
        telemetry::hub().record_lifecycle(LifecyclePhase::ContextInitialized);

        Self {
            argument_policy: ArgumentPolicy::from_lenient_flag(config.commands.lenient_arguments),
            config,
            state,
            audio: AudioEngineManager::new(backend),
            broadcasts,
            scheduler: Mutex::new(None),
            time_source: Arc::new(SystemTimeSource::new()),
        }
    }

    /// Replace the monotonic clock used by discrete mode.
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // ========================================================================
    // FACADE OPERATIONS
    // ========================================================================

    /// Build the click and start the output stream. Idempotent.
    pub fn initialize(&self) -> Result<(), AudioError> {
        let sinks = self.event_sinks();
        let created = self
            .audio
            .initialize(&self.state, &self.config, sinks)
            .inspect_err(|err| self.report(err, "initialize"))?;

        if created {
            telemetry::hub().record_lifecycle(LifecyclePhase::DeviceOpened);
        }
        Ok(())
    }

    /// Start beating at `bpm`. No-op when already running.
    ///
    /// Initializes the output first if the host never called `initialize`.
    pub fn start(&self, bpm: f64, vibrate: bool) -> Result<(), AudioError> {
        let bpm = validate_bpm(bpm)?;
        self.initialize()?;
        let mode = self.audio.mode()?.unwrap_or_default();

        {
            let mut state = self.lock_state()?;
            if state.clock.is_running() {
                log::debug!("[EngineHandle] start ignored, metronome already running");
                return Ok(());
            }

            let now = match mode {
                RenderMode::Continuous => 0.0,
                RenderMode::Discrete => self.time_source.now_secs(),
            };
            state.vibrate = vibrate;
            state.sample_time = 0;
            state.clock.start(bpm, now)?;
        }

        if mode == RenderMode::Discrete {
            if let Err(err) = self.spawn_scheduler() {
                self.report(&err, "start");
                if let Ok(mut state) = self.state.lock() {
                    state.clock.stop();
                }
                return Err(err);
            }
        }

        log::info!(
            "[EngineHandle] Metronome started: bpm={}, vibrate={}, mode={:?}",
            bpm,
            vibrate,
            mode
        );
        telemetry::hub().record_lifecycle(LifecyclePhase::Started);
        Ok(())
    }

    /// Stop beating and rewind playback. No-op when not running.
    ///
    /// When this returns no further beat is fired.
    pub fn stop(&self) -> Result<(), AudioError> {
        let was_running = self.lock_state()?.clock.stop();

        // Join outside the state lock: the scheduler takes it on each tick.
        let scheduler = self.lock_scheduler()?.take();
        if let Some(mut scheduler) = scheduler {
            scheduler.stop();
        }
        if let Some(voice) = self.audio.voice()? {
            voice.silence();
        }
        self.lock_state()?.sample_time = 0;

        if was_running {
            log::info!("[EngineHandle] Metronome stopped");
            telemetry::hub().record_lifecycle(LifecyclePhase::Stopped);
        }
        Ok(())
    }

    /// Change tempo from the next beat boundary onward.
    pub fn set_tempo(&self, bpm: f64) -> Result<(), AudioError> {
        let bpm = validate_bpm(bpm)?;
        self.lock_state()?.clock.set_tempo(bpm)?;
        log::debug!("[EngineHandle] Tempo set to {} BPM", bpm);
        Ok(())
    }

    /// Takes effect from the next beat.
    pub fn set_vibration(&self, enabled: bool) -> Result<(), AudioError> {
        self.lock_state()?.vibrate = enabled;
        Ok(())
    }

    /// Stop, release the output device and join the dispatcher.
    ///
    /// Pending beat events are delivered before this returns. The engine
    /// may be initialized again afterwards.
    pub fn shutdown(&self) -> Result<(), AudioError> {
        self.stop()?;
        if self.audio.teardown(&self.state)? {
            log::info!("[EngineHandle] Output device released");
            telemetry::hub().record_lifecycle(LifecyclePhase::DeviceClosed);
        }
        Ok(())
    }

    // ========================================================================
    // COMMAND SURFACE
    // ========================================================================

    pub fn execute(&self, command: Command) -> Result<(), CommandError> {
        match command {
            Command::Initialize => self.initialize()?,
            Command::Start { bpm, vibrate } => self.start(bpm, vibrate)?,
            Command::Stop => self.stop()?,
            Command::SetTempo { bpm } => self.set_tempo(bpm)?,
            Command::SetVibration { enabled } => self.set_vibration(enabled)?,
            Command::Dispose => self.shutdown()?,
        }
        Ok(())
    }

    /// Parse and run one host method call.
    pub fn handle_method_call(&self, method: &str, arguments: &Value) -> MethodResponse {
        let result = Command::parse(method, arguments, self.argument_policy)
            .and_then(|command| self.execute(command));
        if let Err(err) = &result {
            log_command_error(err, method);
        }
        MethodResponse::from_result(&result)
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    pub fn subscribe_beats(&self) -> broadcast::Receiver<BeatEvent> {
        self.beat_sender().subscribe()
    }

    pub fn subscribe_haptics(&self) -> broadcast::Receiver<HapticPulse> {
        self.haptic_sender().subscribe()
    }

    /// Beat events as a stream. Lagged messages are skipped.
    pub fn beat_stream(&self) -> impl Stream<Item = BeatEvent> {
        BroadcastStream::new(self.subscribe_beats()).filter_map(|item| async move { item.ok() })
    }

    pub fn haptic_stream(&self) -> impl Stream<Item = HapticPulse> {
        BroadcastStream::new(self.subscribe_haptics())
            .filter_map(|item| async move { item.ok() })
    }

    // ========================================================================
    // INTROSPECTION
    // ========================================================================

    pub fn is_initialized(&self) -> bool {
        self.audio.is_initialized()
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.clock.is_running())
            .unwrap_or(false)
    }

    pub fn render_mode(&self) -> Option<RenderMode> {
        self.audio.mode().ok().flatten()
    }

    pub fn snapshot(&self) -> Result<EngineSnapshot, AudioError> {
        let session = self.audio.session_info()?;
        let state = self.lock_state()?;
        Ok(EngineSnapshot {
            clock: state.clock.snapshot(),
            vibrate: state.vibrate,
            session,
        })
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn spawn_scheduler(&self) -> Result<(), AudioError> {
        let voice = self.audio.voice()?.ok_or(AudioError::NotInitialized)?;
        let scheduler = BeatScheduler::spawn(
            Arc::clone(&self.state),
            Arc::clone(&self.time_source),
            voice,
            self.config.scheduler.clone(),
        )?;
        *self.lock_scheduler()? = Some(scheduler);
        Ok(())
    }

    fn event_sinks(&self) -> EventSinks {
        EventSinks {
            beats: self.beat_sender(),
            haptics: self.haptic_sender(),
        }
    }

    fn beat_sender(&self) -> broadcast::Sender<BeatEvent> {
        self.broadcasts
            .beat_sender()
            .unwrap_or_else(|| self.broadcasts.init_beats(self.config.audio.event_channel_capacity))
    }

    fn haptic_sender(&self) -> broadcast::Sender<HapticPulse> {
        self.broadcasts.haptic_sender().unwrap_or_else(|| {
            self.broadcasts
                .init_haptics(self.config.audio.event_channel_capacity)
        })
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, MetronomeState>, AudioError> {
        self.state.lock().map_err(|_| {
            let err = AudioError::LockPoisoned {
                component: "metronome_state".to_string(),
            };
            self.report(&err, "lock_state");
            err
        })
    }

    fn lock_scheduler(&self) -> Result<MutexGuard<'_, Option<BeatScheduler>>, AudioError> {
        self.scheduler.lock().map_err(|_| AudioError::LockPoisoned {
            component: "beat_scheduler".to_string(),
        })
    }

    fn report(&self, err: &AudioError, context: &str) {
        log_audio_error(err, context);
        let code = match err {
            AudioError::LockPoisoned { .. } => DiagnosticError::LockPoisoned,
            AudioError::DeviceUnavailable { .. } => DiagnosticError::DeviceUnavailable,
            AudioError::StreamOpenFailed { .. } | AudioError::HardwareError { .. } => {
                DiagnosticError::StreamFailure
            }
            _ => DiagnosticError::Unknown,
        };
        telemetry::hub().record_error(code, context);
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log_audio_error(&err, "drop");
        }
    }
}
