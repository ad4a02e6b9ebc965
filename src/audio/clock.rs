//! Beat Clock - drift-free beat boundary scheduling
//!
//! Every boundary is computed from a fixed anchor and an integer index:
//! `boundary(k) = anchor + (k - anchor_index) × interval`. Nothing is ever
//! derived from the previously *observed* firing position, so late check-ins
//! do not accumulate error.
//!
//! The same clock runs in two domains:
//! - [`ClockDomain::Time`]: positions are monotonic seconds (discrete mode)
//! - [`ClockDomain::Samples`]: positions are output stream sample indices
//!   (continuous mode)

use serde::Serialize;

use crate::error::AudioError;

/// Tempo used when none has been set yet.
pub const DEFAULT_BPM: f64 = 100.0;

/// Fastest accepted tempo. Keeps every beat interval many samples long
/// at any supported rate, so boundary indices stay small.
pub const MAX_BPM: f64 = 1000.0;

/// Rejects tempos that are non-finite, not strictly positive or above
/// [`MAX_BPM`].
#[inline]
pub fn validate_bpm(bpm: f64) -> Result<f64, AudioError> {
    if bpm.is_finite() && bpm > 0.0 && bpm <= MAX_BPM {
        Ok(bpm)
    } else {
        Err(AudioError::BpmInvalid { bpm })
    }
}

/// Unit in which clock positions are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum ClockDomain {
    /// Positions in seconds from a monotonic time source.
    Time,
    /// Positions in samples of the output stream.
    Samples { sample_rate: f64 },
}

impl ClockDomain {
    /// Beat interval in this domain's units.
    #[inline]
    pub fn interval_for(&self, bpm: f64) -> f64 {
        match self {
            ClockDomain::Time => 60.0 / bpm,
            ClockDomain::Samples { sample_rate } => sample_rate * 60.0 / bpm,
        }
    }

    /// Convert a distance in clock units to milliseconds.
    #[inline]
    pub fn to_millis(&self, units: f64) -> f64 {
        match self {
            ClockDomain::Time => units * 1000.0,
            ClockDomain::Samples { sample_rate } => units * 1000.0 / sample_rate,
        }
    }
}

/// Result of a poll that crossed a beat boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatTick {
    /// 1-based count of beats fired since `start`.
    pub beat_count: u64,
    /// Position of the boundary that fired.
    pub boundary: f64,
    /// Boundaries that elapsed unfired because the check-in was late.
    pub skipped: u64,
    /// How far past the boundary the poll happened, in clock units.
    pub lateness: f64,
    pub bpm: f64,
}

/// Serializable view of the clock for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSnapshot {
    #[serde(flatten)]
    pub domain: ClockDomain,
    pub bpm: f64,
    pub interval: f64,
    pub beat_count: u64,
    pub next_beat: Option<f64>,
    pub running: bool,
}

#[derive(Debug, Clone)]
pub struct BeatClock {
    domain: ClockDomain,
    bpm: f64,
    interval: f64,
    origin: f64,
    anchor: f64,
    anchor_index: u64,
    next_index: u64,
    beat_count: u64,
    last_beat: Option<f64>,
    running: bool,
}

impl BeatClock {
    pub fn new(domain: ClockDomain) -> Self {
        Self {
            domain,
            bpm: DEFAULT_BPM,
            interval: domain.interval_for(DEFAULT_BPM),
            origin: 0.0,
            anchor: 0.0,
            anchor_index: 0,
            next_index: 0,
            beat_count: 0,
            last_beat: None,
            running: false,
        }
    }

    /// Switch domain while idle. Ignored while running.
    pub fn set_domain(&mut self, domain: ClockDomain) {
        if self.running {
            return;
        }
        self.domain = domain;
        self.interval = domain.interval_for(self.bpm);
    }

    /// Start the beat sequence with the first boundary at `now`.
    ///
    /// Returns `Ok(false)` without touching any state when already running.
    pub fn start(&mut self, bpm: f64, now: f64) -> Result<bool, AudioError> {
        let bpm = validate_bpm(bpm)?;
        if self.running {
            return Ok(false);
        }

        self.bpm = bpm;
        self.interval = self.domain.interval_for(bpm);
        self.origin = now;
        self.anchor = now;
        self.anchor_index = 0;
        self.next_index = 0;
        self.beat_count = 0;
        self.last_beat = None;
        self.running = true;
        Ok(true)
    }

    /// Returns `false` when the clock was already idle.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        true
    }

    /// Change tempo from the pending boundary onward.
    ///
    /// While running, the pending boundary becomes the new anchor so beats
    /// already scheduled keep their positions and later ones use the new
    /// interval. Origin and beat count are untouched.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), AudioError> {
        let bpm = validate_bpm(bpm)?;
        if self.running {
            self.anchor = self.boundary(self.next_index);
            self.anchor_index = self.next_index;
        }
        self.bpm = bpm;
        self.interval = self.domain.interval_for(bpm);
        Ok(())
    }

    /// Check `now` against the pending boundary.
    ///
    /// Fires at most one beat per call. When several boundaries elapsed the
    /// latest one fires and the others are reported as skipped.
    pub fn poll(&mut self, now: f64) -> Option<BeatTick> {
        if !self.running || now < self.boundary(self.next_index) {
            return None;
        }

        let fired = self.latest_elapsed_index(now).max(self.next_index);
        let boundary = self.boundary(fired);
        let skipped = fired - self.next_index;

        self.next_index = fired.saturating_add(1);
        self.beat_count = self.beat_count.saturating_add(1);
        self.last_beat = Some(boundary);

        Some(BeatTick {
            beat_count: self.beat_count,
            boundary,
            skipped,
            lateness: now - boundary,
            bpm: self.bpm,
        })
    }

    /// Distance from `now` to the pending boundary, zero if already due.
    pub fn time_until_next(&self, now: f64) -> Option<f64> {
        self.next_beat().map(|next| (next - now).max(0.0))
    }

    pub fn next_beat(&self) -> Option<f64> {
        self.running.then(|| self.boundary(self.next_index))
    }

    /// Boundary of the most recently fired beat since the last `start`.
    pub fn last_beat(&self) -> Option<f64> {
        self.last_beat
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    pub fn domain(&self) -> ClockDomain {
        self.domain
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            domain: self.domain,
            bpm: self.bpm,
            interval: self.interval,
            beat_count: self.beat_count,
            next_beat: self.next_beat(),
            running: self.running,
        }
    }

    #[inline]
    fn boundary(&self, index: u64) -> f64 {
        self.anchor + index.saturating_sub(self.anchor_index) as f64 * self.interval
    }

    /// Largest index whose boundary is `<= now`, never below the anchor.
    fn latest_elapsed_index(&self, now: f64) -> u64 {
        let steps = ((now - self.anchor) / self.interval).floor().max(0.0);
        let mut index = self.anchor_index.saturating_add(steps as u64);

        // Division and multiplication can disagree by one ulp at a boundary.
        if index > self.anchor_index && self.boundary(index) > now {
            index -= 1;
        }
        if index < u64::MAX && self.boundary(index + 1) <= now {
            index += 1;
        }
        index
    }
}

impl Default for BeatClock {
    fn default() -> Self {
        Self::new(ClockDomain::Time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(bpm: f64, now: f64) -> BeatClock {
        let mut clock = BeatClock::new(ClockDomain::Time);
        assert_eq!(clock.start(bpm, now), Ok(true));
        clock
    }

    #[test]
    fn test_rejects_invalid_bpm() {
        let mut clock = BeatClock::default();
        for bpm in [0.0, -60.0, f64::NAN, f64::INFINITY, 1e30, MAX_BPM * 1.5] {
            assert!(matches!(
                clock.start(bpm, 0.0),
                Err(AudioError::BpmInvalid { .. })
            ));
            assert!(matches!(
                clock.set_tempo(bpm),
                Err(AudioError::BpmInvalid { .. })
            ));
        }
        assert!(!clock.is_running());
        assert_eq!(clock.bpm(), DEFAULT_BPM);
    }

    #[test]
    fn test_fastest_tempo_survives_far_future_poll() {
        let mut clock = BeatClock::new(ClockDomain::Samples {
            sample_rate: 44_100.0,
        });
        assert_eq!(clock.start(MAX_BPM, 0.0), Ok(true));
        assert_eq!(clock.interval(), 2_646.0);

        let first = clock.poll(0.0).unwrap();
        assert_eq!(first.beat_count, 1);

        let late = clock.poll(1e12).unwrap();
        assert_eq!(late.beat_count, 2);
        assert!(late.skipped > 0);
        assert!(late.boundary <= 1e12);
        assert!(clock.next_beat().unwrap() > 1e12);
    }

    #[test]
    fn test_120_bpm_scenario() {
        let mut clock = started(120.0, 0.0);

        let tick = clock.poll(0.0).expect("beat at t=0");
        assert_eq!(tick.beat_count, 1);
        assert!(clock.poll(0.25).is_none(), "no beat at 250ms");

        for (expected_count, t) in [(2, 0.5), (3, 1.0), (4, 1.5)] {
            let tick = clock.poll(t).expect("beat on boundary");
            assert_eq!(tick.beat_count, expected_count);
            assert_eq!(tick.boundary, t);
            assert_eq!(tick.skipped, 0);
        }
        assert!(clock.poll(1.75).is_none());
    }

    #[test]
    fn test_drift_free_over_many_beats() {
        for bpm in [37.0, 60.0, 97.3, 120.0, 208.0] {
            let origin = 12.345;
            let mut clock = started(bpm, origin);
            let interval = 60.0 / bpm;

            for k in 0..20_000u64 {
                let on_beat = origin + k as f64 * interval;
                let tick = clock
                    .poll(on_beat)
                    .unwrap_or_else(|| panic!("missing beat {} at {} BPM", k, bpm));
                assert_eq!(tick.beat_count, k + 1);
                assert_eq!(tick.skipped, 0);

                let between = origin + (k as f64 + 0.5) * interval;
                assert!(
                    clock.poll(between).is_none(),
                    "spurious beat between boundaries {} and {} at {} BPM",
                    k,
                    k + 1,
                    bpm
                );
            }
        }
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut clock = started(120.0, 1.0);
        clock.poll(1.0);
        clock.poll(1.5);

        assert_eq!(clock.start(60.0, 5.0), Ok(false));
        assert_eq!(clock.origin(), 1.0);
        assert_eq!(clock.beat_count(), 2);
        assert_eq!(clock.bpm(), 120.0);
        assert_eq!(clock.next_beat(), Some(2.0));
    }

    #[test]
    fn test_stop_then_start_resets_sequence() {
        let mut clock = started(120.0, 0.0);
        clock.poll(0.0);
        clock.poll(0.5);

        assert!(clock.stop());
        assert!(!clock.stop(), "second stop is a no-op");
        assert!(clock.poll(1.0).is_none(), "no beats after stop");

        assert_eq!(clock.start(120.0, 10.0), Ok(true));
        assert_eq!(clock.beat_count(), 0);
        assert_eq!(clock.origin(), 10.0);
        assert_eq!(clock.last_beat(), None);
        assert_eq!(clock.poll(10.0).map(|t| t.beat_count), Some(1));
    }

    #[test]
    fn test_set_tempo_applies_from_pending_boundary() {
        let mut clock = started(60.0, 0.0);
        assert!(clock.poll(0.0).is_some());

        clock.set_tempo(90.0).unwrap();
        assert_eq!(clock.next_beat(), Some(1.0), "pending beat keeps its slot");
        assert!(clock.poll(0.9).is_none());

        let tick = clock.poll(1.0).expect("beat at 1000ms");
        assert_eq!(tick.beat_count, 2);
        assert_eq!(tick.bpm, 90.0);

        let next = clock.next_beat().unwrap();
        assert!((next - (1.0 + 60.0 / 90.0)).abs() < 1e-12);
        assert!(clock.poll(1.6).is_none());
        assert!(clock.poll(next).is_some());
        assert!((clock.next_beat().unwrap() - (1.0 + 2.0 * 60.0 / 90.0)).abs() < 1e-12);
        assert_eq!(clock.origin(), 0.0);
    }

    #[test]
    fn test_set_tempo_right_before_boundary_fires_once() {
        let mut clock = started(120.0, 0.0);
        clock.poll(0.0);

        clock.set_tempo(121.0).unwrap();
        clock.set_tempo(119.0).unwrap();
        let tick = clock.poll(0.500_000_1).expect("pending boundary fires");
        assert_eq!(tick.boundary, 0.5);
        assert!(clock.poll(0.500_000_2).is_none(), "no double fire");
        assert_eq!(clock.beat_count(), 2);
    }

    #[test]
    fn test_set_tempo_while_idle_only_changes_interval() {
        let mut clock = BeatClock::default();
        clock.set_tempo(150.0).unwrap();
        assert_eq!(clock.bpm(), 150.0);
        assert!((clock.interval() - 0.4).abs() < 1e-12);
        assert_eq!(clock.next_beat(), None);
    }

    #[test]
    fn test_late_poll_skips_missed_boundaries() {
        let mut clock = started(120.0, 0.0);
        clock.poll(0.0);

        let tick = clock.poll(1.7).expect("late beat");
        assert_eq!(tick.boundary, 1.5);
        assert_eq!(tick.skipped, 2);
        assert_eq!(tick.beat_count, 2);
        assert!((tick.lateness - 0.2).abs() < 1e-12);
        assert_eq!(clock.next_beat(), Some(2.0));
    }

    #[test]
    fn test_sample_domain_intervals() {
        let mut clock = BeatClock::new(ClockDomain::Samples {
            sample_rate: 44_100.0,
        });
        clock.start(120.0, 0.0).unwrap();
        assert_eq!(clock.interval(), 22_050.0);

        let mut beats = Vec::new();
        for s in 0..88_200u64 {
            if let Some(tick) = clock.poll(s as f64) {
                beats.push(tick.boundary as u64);
            }
        }
        assert_eq!(beats, vec![0, 22_050, 44_100, 66_150]);
    }

    #[test]
    fn test_fractional_sample_interval_fires_on_next_sample() {
        let mut clock = BeatClock::new(ClockDomain::Samples {
            sample_rate: 44_100.0,
        });
        clock.start(77.0, 0.0).unwrap();
        let interval = clock.interval();
        assert!(interval.fract() > 0.0);

        clock.poll(0.0);
        let first_integer_after = interval.ceil();
        assert!(clock.poll(first_integer_after - 1.0).is_none());
        let tick = clock.poll(first_integer_after).expect("beat");
        assert!(tick.lateness >= 0.0 && tick.lateness < 1.0);
    }

    #[test]
    fn test_domain_conversions() {
        assert_eq!(ClockDomain::Time.to_millis(0.5), 500.0);
        let samples = ClockDomain::Samples {
            sample_rate: 48_000.0,
        };
        assert_eq!(samples.to_millis(480.0), 10.0);
        assert_eq!(samples.interval_for(60.0), 48_000.0);
        assert_eq!(samples.interval_for(120.0), 24_000.0);

        let cd_rate = ClockDomain::Samples {
            sample_rate: 44_100.0,
        };
        assert_eq!(cd_rate.interval_for(100.0), 26_460.0);
        assert!((cd_rate.interval_for(90.0) - 29_400.0).abs() < 1e-9);
        assert_eq!(ClockDomain::Time.interval_for(120.0), 0.5);
    }

    #[test]
    fn test_time_until_next() {
        let mut clock = started(60.0, 0.0);
        assert_eq!(clock.time_until_next(0.0), Some(0.0));
        clock.poll(0.0);
        assert_eq!(clock.time_until_next(0.25), Some(0.75));
        clock.stop();
        assert_eq!(clock.time_until_next(0.5), None);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let clock = started(120.0, 0.0);
        let json = serde_json::to_value(clock.snapshot()).unwrap();
        assert_eq!(json["domain"], "time");
        assert_eq!(json["beatCount"], 0);
        assert_eq!(json["nextBeat"], 0.0);
        assert_eq!(json["running"], true);
    }
}
