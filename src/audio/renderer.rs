//! Audio Renderer - fills output buffers with clicks at beat boundaries
//!
//! Two render paths share one contract: silence everywhere except a
//! decaying click starting exactly at each beat boundary.
//!
//! - [`ContinuousRenderer`] polls the sample-domain clock once per output
//!   frame and copies `click[s - last_boundary]` while inside the click.
//! - [`ClickVoice`] is a one-shot player restarted from sample 0 by the
//!   discrete scheduler through its [`VoiceTrigger`].
//!
//! Neither path blocks or propagates errors. A poisoned state lock or a
//! stopped clock yields silence for that cycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::clock::{BeatClock, BeatTick, ClockDomain};
use crate::audio::dispatch::{EngineEvent, EventPublisher};
use crate::audio::metronome::ClickWaveform;

/// Real-time render callback driven by an audio backend.
///
/// `out` is interleaved with `channels` channels. Implementations must not
/// allocate, block or log.
pub trait AudioRender: Send + 'static {
    fn render(&mut self, out: &mut [f32], channels: usize);
}

/// State shared between the control domain and the rendering domain.
///
/// Only ever touched under [`SharedState`]'s lock with short holds.
pub struct MetronomeState {
    pub clock: BeatClock,
    pub vibrate: bool,
    /// Absolute output position in samples since the last start.
    pub sample_time: u64,
    pub haptic_pulse_ms: u32,
    events: Option<EventPublisher>,
}

pub type SharedState = Arc<Mutex<MetronomeState>>;

impl MetronomeState {
    pub fn new(domain: ClockDomain, haptic_pulse_ms: u32) -> Self {
        Self {
            clock: BeatClock::new(domain),
            vibrate: false,
            sample_time: 0,
            haptic_pulse_ms,
            events: None,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    pub fn attach_events(&mut self, publisher: EventPublisher) {
        self.events = Some(publisher);
    }

    pub fn detach_events(&mut self) -> Option<EventPublisher> {
        self.events.take()
    }

    /// Poll the clock and enqueue the beat (and haptic) notification.
    #[inline]
    pub fn poll(&mut self, now: f64) -> Option<BeatTick> {
        let tick = self.clock.poll(now)?;
        if let Some(events) = self.events.as_mut() {
            events.publish(EngineEvent::beat(&tick, self.clock.domain()));
            if self.vibrate {
                events.publish(EngineEvent::Haptic {
                    duration_ms: self.haptic_pulse_ms,
                });
            }
        }
        Some(tick)
    }
}

/// Sample-accurate renderer for [`ClockDomain::Samples`].
pub struct ContinuousRenderer {
    state: SharedState,
    click: ClickWaveform,
}

impl ContinuousRenderer {
    pub fn new(state: SharedState, click: ClickWaveform) -> Self {
        Self { state, click }
    }
}

impl AudioRender for ContinuousRenderer {
    fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let Ok(mut state) = self.state.lock() else {
            out.fill(0.0);
            return;
        };
        if !state.clock.is_running() {
            out.fill(0.0);
            return;
        }

        for frame in out.chunks_mut(channels) {
            let position = state.sample_time as f64;
            state.poll(position);

            let sample = state
                .clock
                .last_beat()
                .map(|boundary| position - boundary)
                .filter(|offset| *offset >= 0.0)
                .and_then(|offset| self.click.get(offset as usize))
                .unwrap_or(0.0);

            frame.fill(sample);
            state.sample_time += 1;
        }
    }
}

/// Control handle for a [`ClickVoice`].
#[derive(Clone)]
pub struct VoiceTrigger {
    playhead: Arc<AtomicUsize>,
    len: usize,
}

impl VoiceTrigger {
    /// Restart the click from its first sample, cutting any click in flight.
    #[inline]
    pub fn retrigger(&self) {
        self.playhead.store(0, Ordering::Release);
    }

    pub fn silence(&self) {
        self.playhead.store(self.len, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playhead.load(Ordering::Acquire) < self.len
    }
}

/// One-shot click player used in discrete mode.
pub struct ClickVoice {
    click: ClickWaveform,
    playhead: Arc<AtomicUsize>,
}

impl ClickVoice {
    pub fn new(click: ClickWaveform) -> (Self, VoiceTrigger) {
        let len = click.len();
        let playhead = Arc::new(AtomicUsize::new(len));
        let trigger = VoiceTrigger {
            playhead: Arc::clone(&playhead),
            len,
        };
        (Self { click, playhead }, trigger)
    }
}

impl AudioRender for ClickVoice {
    fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let start = self.playhead.load(Ordering::Acquire);
        let mut position = start;

        for frame in out.chunks_mut(channels) {
            let sample = match self.click.get(position) {
                Some(sample) => {
                    position += 1;
                    sample
                }
                None => 0.0,
            };
            frame.fill(sample);
        }

        if position != start {
            // A retrigger during this buffer wins over our advance.
            let _ = self.playhead.compare_exchange(
                start,
                position,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::dispatch::event_queue;
    use crate::config::ClickConfig;

    const RATE: u32 = 8_000;

    fn click() -> ClickWaveform {
        ClickWaveform::new(
            RATE,
            &ClickConfig {
                duration_ms: 10.0,
                frequency_hz: 900.0,
                amplitude: 0.8,
            },
        )
    }

    fn sample_state() -> SharedState {
        MetronomeState::new(
            ClockDomain::Samples {
                sample_rate: RATE as f64,
            },
            15,
        )
        .shared()
    }

    fn render_mono(renderer: &mut impl AudioRender, frames: usize) -> Vec<f32> {
        let mut out = vec![1.0; frames];
        renderer.render(&mut out, 1);
        out
    }

    #[test]
    fn test_silence_when_stopped() {
        let state = sample_state();
        let mut renderer = ContinuousRenderer::new(Arc::clone(&state), click());
        let out = render_mono(&mut renderer, 256);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(state.lock().unwrap().sample_time, 0);
    }

    #[test]
    fn test_clicks_start_exactly_on_boundaries() {
        let click = click();
        let state = sample_state();
        state.lock().unwrap().clock.start(120.0, 0.0).unwrap();

        let mut renderer = ContinuousRenderer::new(Arc::clone(&state), click.clone());
        // 2 seconds at 120 BPM -> boundaries at 0, 4000, 8000, 12000.
        let out = render_mono(&mut renderer, 16_000);

        for boundary in [0usize, 4_000, 8_000, 12_000] {
            assert_eq!(
                &out[boundary..boundary + click.len()],
                click.samples(),
                "click must start at sample {}",
                boundary
            );
            assert!(out[boundary + click.len()..boundary + 4_000]
                .iter()
                .all(|&s| s == 0.0));
        }
        assert_eq!(state.lock().unwrap().clock.beat_count(), 4);
    }

    #[test]
    fn test_block_size_does_not_change_output() {
        let click = click();
        let whole = {
            let state = sample_state();
            state.lock().unwrap().clock.start(97.0, 0.0).unwrap();
            let mut renderer = ContinuousRenderer::new(state, click.clone());
            render_mono(&mut renderer, 20_000)
        };

        let state = sample_state();
        state.lock().unwrap().clock.start(97.0, 0.0).unwrap();
        let mut renderer = ContinuousRenderer::new(state, click);
        let mut chunked = Vec::new();
        for size in [1usize, 63, 512, 17, 4096].iter().cycle() {
            if chunked.len() >= 20_000 {
                break;
            }
            let n = (*size).min(20_000 - chunked.len());
            chunked.extend(render_mono(&mut renderer, n));
        }
        assert_eq!(whole, chunked);
    }

    #[test]
    fn test_stereo_output_duplicates_mono() {
        let state = sample_state();
        state.lock().unwrap().clock.start(120.0, 0.0).unwrap();
        let mut renderer = ContinuousRenderer::new(state, click());

        let mut out = vec![0.0; 200];
        renderer.render(&mut out, 2);
        for frame in out.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_overlapping_clicks_truncate_previous() {
        let click = click();
        // 1000 BPM on a 600 Hz clock -> 36 samples per beat, shorter than the click.
        let state = MetronomeState::new(ClockDomain::Samples { sample_rate: 600.0 }, 15).shared();
        state.lock().unwrap().clock.start(1000.0, 0.0).unwrap();
        let mut renderer = ContinuousRenderer::new(state, click.clone());
        let out = render_mono(&mut renderer, 144);
        assert!(click.len() > 36);
        for beat in 0..4 {
            assert_eq!(&out[beat * 36..beat * 36 + 36], &click.samples()[..36]);
        }
    }

    #[test]
    fn test_beats_and_haptics_published() {
        let (publisher, mut queue) = event_queue(16);
        let state = sample_state();
        {
            let mut guard = state.lock().unwrap();
            guard.attach_events(publisher);
            guard.vibrate = true;
            guard.clock.start(120.0, 0.0).unwrap();
        }
        let mut renderer = ContinuousRenderer::new(Arc::clone(&state), click());
        render_mono(&mut renderer, 4_001);

        let events: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], EngineEvent::Beat { beat_count: 1, .. }));
        assert_eq!(events[1], EngineEvent::Haptic { duration_ms: 15 });
        assert!(matches!(events[2], EngineEvent::Beat { beat_count: 2, .. }));

        state.lock().unwrap().vibrate = false;
        render_mono(&mut renderer, 4_000);
        let events: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(events.len(), 1, "no haptic once vibration is off");
    }

    #[test]
    fn test_poisoned_lock_renders_silence() {
        let state = sample_state();
        state.lock().unwrap().clock.start(120.0, 0.0).unwrap();
        let poisoner = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the state lock");
        })
        .join();

        let mut renderer = ContinuousRenderer::new(state, click());
        let out = render_mono(&mut renderer, 64);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_voice_is_silent_until_triggered() {
        let (mut voice, trigger) = ClickVoice::new(click());
        assert!(!trigger.is_playing());
        let out = render_mono(&mut voice, 128);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_voice_plays_full_click_then_silence() {
        let click = click();
        let (mut voice, trigger) = ClickVoice::new(click.clone());
        trigger.retrigger();

        let mut out = Vec::new();
        while out.len() < click.len() + 50 {
            out.extend(render_mono(&mut voice, 32));
        }
        assert_eq!(&out[..click.len()], click.samples());
        assert!(out[click.len()..].iter().all(|&s| s == 0.0));
        assert!(!trigger.is_playing());
    }

    #[test]
    fn test_voice_retrigger_restarts_from_zero() {
        let click = click();
        let (mut voice, trigger) = ClickVoice::new(click.clone());
        trigger.retrigger();
        render_mono(&mut voice, 30);

        trigger.retrigger();
        let out = render_mono(&mut voice, 10);
        assert_eq!(&out[..], &click.samples()[..10]);

        trigger.silence();
        assert!(render_mono(&mut voice, 10).iter().all(|&s| s == 0.0));
    }
}
