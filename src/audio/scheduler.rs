//! Discrete-mode beat scheduler
//!
//! A dedicated thread runs a current-thread tokio runtime that polls the
//! time-domain clock, restarts the click voice on each beat and re-arms
//! itself with `min(max_check, time_to_next_beat)`, never below
//! `min_check`. Cancellation is cooperative: the loop exits when the clock
//! stops or when [`BeatScheduler::stop`] wakes the armed timer.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::Notify;

use crate::audio::renderer::{SharedState, VoiceTrigger};
use crate::config::SchedulerConfig;
use crate::engine::backend::TimeSource;
use crate::error::AudioError;

/// Delay before the next check-in, given the time left until the next beat.
pub fn recheck_delay(remaining_secs: f64, cadence: &SchedulerConfig) -> Duration {
    let max_ms = cadence.max_check_interval_ms.max(cadence.min_check_interval_ms);
    let remaining_ms = if remaining_secs.is_finite() {
        remaining_secs * 1000.0
    } else {
        max_ms
    };
    let delay_ms = remaining_ms.min(max_ms).max(cadence.min_check_interval_ms);
    Duration::from_micros((delay_ms.max(0.0) * 1000.0).round() as u64)
}

pub struct BeatScheduler {
    cancel: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl BeatScheduler {
    /// Spawn the scheduler loop. The clock must already be running.
    pub fn spawn(
        state: SharedState,
        time: Arc<dyn TimeSource>,
        voice: VoiceTrigger,
        cadence: SchedulerConfig,
    ) -> Result<Self, AudioError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let cancel = Arc::new(Notify::new());
        let cancelled = Arc::clone(&cancel);

        let handle = std::thread::Builder::new()
            .name("metronome-scheduler".to_string())
            .spawn(move || {
                runtime.block_on(run(state, time, voice, cadence, cancelled));
            })?;

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    /// Cancel the armed timer and wait for the loop to exit.
    pub fn stop(&mut self) {
        self.cancel.notify_one();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[Scheduler] Scheduler thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for BeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    state: SharedState,
    time: Arc<dyn TimeSource>,
    voice: VoiceTrigger,
    cadence: SchedulerConfig,
    cancel: Arc<Notify>,
) {
    log::debug!("[Scheduler] Beat scheduler started");
    loop {
        let delay = {
            let Ok(mut guard) = state.lock() else {
                log::error!("[Scheduler] Metronome state lock poisoned, stopping");
                break;
            };
            if !guard.clock.is_running() {
                break;
            }

            let now = time.now_secs();
            if guard.poll(now).is_some() {
                voice.retrigger();
            }
            match guard.clock.time_until_next(now) {
                Some(remaining) => recheck_delay(remaining, &cadence),
                None => break,
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.notified() => break,
        }
    }
    log::debug!("[Scheduler] Beat scheduler exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ClockDomain;
    use crate::audio::dispatch::{event_queue, EngineEvent};
    use crate::audio::metronome::ClickWaveform;
    use crate::audio::renderer::{ClickVoice, MetronomeState};
    use crate::config::ClickConfig;
    use crate::engine::backend::{ManualTimeSource, SystemTimeSource};

    fn cadence() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    #[test]
    fn test_recheck_delay_bounds() {
        let c = cadence();
        assert_eq!(recheck_delay(1.0, &c), Duration::from_millis(5));
        assert_eq!(recheck_delay(0.003, &c), Duration::from_millis(3));
        assert_eq!(recheck_delay(0.0, &c), Duration::from_millis(1));
        assert_eq!(recheck_delay(0.0004, &c), Duration::from_millis(1));
        assert_eq!(recheck_delay(f64::INFINITY, &c), Duration::from_millis(5));
    }

    #[test]
    fn test_stop_returns_promptly_and_cancels_loop() {
        let state = MetronomeState::new(ClockDomain::Time, 15).shared();
        let time = Arc::new(ManualTimeSource::new());
        state.lock().unwrap().clock.start(60.0, 0.0).unwrap();
        let (_voice, trigger) = ClickVoice::new(ClickWaveform::new(
            44_100,
            &ClickConfig::default(),
        ));

        let mut scheduler =
            BeatScheduler::spawn(Arc::clone(&state), time, trigger, cadence()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(scheduler.is_running());

        let begin = std::time::Instant::now();
        scheduler.stop();
        assert!(begin.elapsed() < Duration::from_millis(500));
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_loop_exits_when_clock_stops() {
        let state = MetronomeState::new(ClockDomain::Time, 15).shared();
        let time = Arc::new(ManualTimeSource::new());
        state.lock().unwrap().clock.start(60.0, 0.0).unwrap();
        let (_voice, trigger) = ClickVoice::new(ClickWaveform::new(
            44_100,
            &ClickConfig::default(),
        ));

        let mut scheduler =
            BeatScheduler::spawn(Arc::clone(&state), time, trigger, cadence()).unwrap();
        state.lock().unwrap().clock.stop();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!scheduler.is_running(), "loop observes the stopped clock");
        scheduler.stop();
    }

    #[test]
    fn test_fires_beats_and_retriggers_voice() {
        let (publisher, mut queue) = event_queue(64);
        let state = MetronomeState::new(ClockDomain::Time, 15).shared();
        let time = Arc::new(ManualTimeSource::new());
        {
            let mut guard = state.lock().unwrap();
            guard.attach_events(publisher);
            guard.clock.start(600.0, 0.0).unwrap();
        }
        let (_voice, trigger) = ClickVoice::new(ClickWaveform::new(
            44_100,
            &ClickConfig::default(),
        ));
        let probe = trigger.clone();

        let mut scheduler = BeatScheduler::spawn(
            Arc::clone(&state),
            Arc::clone(&time) as Arc<dyn TimeSource>,
            trigger,
            cadence(),
        )
        .unwrap();

        // Beat at t=0 fires on the first check-in.
        std::thread::sleep(Duration::from_millis(30));
        assert!(probe.is_playing());

        // Advance manual time over two more boundaries (100ms interval).
        time.set_secs(0.1);
        std::thread::sleep(Duration::from_millis(30));
        time.set_secs(0.2);
        std::thread::sleep(Duration::from_millis(30));
        scheduler.stop();

        let beats: Vec<u64> = std::iter::from_fn(|| queue.pop())
            .filter_map(|event| match event {
                EngineEvent::Beat { beat_count, .. } => Some(beat_count),
                _ => None,
            })
            .collect();
        assert_eq!(beats, vec![1, 2, 3]);
    }

    #[test]
    fn test_real_time_source_keeps_tempo() {
        let (publisher, mut queue) = event_queue(64);
        let state = MetronomeState::new(ClockDomain::Time, 15).shared();
        let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());
        {
            let mut guard = state.lock().unwrap();
            guard.attach_events(publisher);
            let now = time.now_secs();
            guard.clock.start(1000.0, now).unwrap();
        }
        let (_voice, trigger) = ClickVoice::new(ClickWaveform::new(
            44_100,
            &ClickConfig::default(),
        ));

        let mut scheduler =
            BeatScheduler::spawn(Arc::clone(&state), time, trigger, cadence()).unwrap();
        std::thread::sleep(Duration::from_millis(500));
        scheduler.stop();

        // 60ms interval over ~500ms: about 9 beats, allow for CI jitter.
        let fired = state.lock().unwrap().clock.beat_count();
        assert!((6..=11).contains(&fired), "fired {} beats", fired);
        let mut last = 0;
        while let Some(event) = queue.pop() {
            if let EngineEvent::Beat { beat_count, .. } = event {
                assert_eq!(beat_count, last + 1, "beats are sequential");
                last = beat_count;
            }
        }
    }
}
