//! Metronome click generation
//!
//! The click is a short sine tone shaped by an exponential decay envelope.
//! It is generated once per session and shared read-only by the renderer;
//! the sound does not depend on tempo.

use std::sync::Arc;

use crate::config::ClickConfig;

/// Envelope time constant: the tone decays to e^-5 of its peak over the buffer.
const DECAY_RATE: f64 = 5.0;

/// Number of samples for a click of `duration_ms` at `sample_rate`.
///
/// Ties round to even, so 44.1 kHz × 25 ms (1102.5) yields 1102 samples.
#[inline]
pub fn click_length(sample_rate: u32, duration_ms: f64) -> usize {
    let exact = sample_rate as f64 * duration_ms / 1000.0;
    if !exact.is_finite() || exact <= 0.0 {
        return 0;
    }
    exact.round_ties_even() as usize
}

/// Decay multiplier for sample `index` of an `len`-sample click.
#[inline]
pub fn envelope(index: usize, len: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    (-DECAY_RATE * index as f64 / len as f64).exp()
}

/// Generates the click waveform as floating point samples in [-1.0, 1.0].
///
/// `sample[i] = sin(2π · f · i / sr) · amplitude · exp(-5 · i / N)`
///
/// # Examples
/// ```
/// use native_metronome::audio::metronome::generate_click_waveform;
/// let click = generate_click_waveform(44_100, 25.0, 900.0, 0.8);
/// assert_eq!(click.len(), 1102);
/// ```
pub fn generate_click_waveform(
    sample_rate: u32,
    duration_ms: f64,
    frequency_hz: f64,
    amplitude: f64,
) -> Vec<f32> {
    let len = click_length(sample_rate, duration_ms);
    let step = 2.0 * std::f64::consts::PI * frequency_hz / sample_rate as f64;

    (0..len)
        .map(|i| {
            let raw = (step * i as f64).sin() * amplitude * envelope(i, len);
            raw.clamp(-1.0, 1.0) as f32
        })
        .collect()
}

/// Converts a float sample to 16-bit PCM, clamping instead of wrapping.
#[inline]
pub fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Immutable click buffer shared between the control and render domains.
#[derive(Debug, Clone)]
pub struct ClickWaveform {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl ClickWaveform {
    pub fn new(sample_rate: u32, config: &ClickConfig) -> Self {
        let samples = generate_click_waveform(
            sample_rate,
            config.duration_ms,
            config.frequency_hz,
            config.amplitude,
        );
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn get(&self, offset: usize) -> Option<f32> {
        self.samples.get(offset).copied()
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .fold(0.0_f32, |acc, sample| acc.max(sample.abs()))
    }

    pub fn to_pcm16(&self) -> Vec<i16> {
        self.samples.iter().copied().map(to_pcm16).collect()
    }
}
