//! Pull-driven backend without a device.
//!
//! The renderer is invoked only when the paired [`OfflineDriver`] asks for
//! frames, which makes engine output fully deterministic. Used by tests and
//! by the CLI's WAV rendering.

use std::sync::{Arc, Mutex, PoisonError};

use crate::audio::AudioRender;
use crate::error::AudioError;

use super::{AudioBackend, StreamFormat};

type RendererSlot = Arc<Mutex<Option<Box<dyn AudioRender>>>>;

pub struct OfflineBackend {
    format: StreamFormat,
    slot: RendererSlot,
    open: bool,
    sample_accurate: bool,
    open_failure: Option<String>,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32) -> (Self, OfflineDriver) {
        Self::with_channels(sample_rate, 1)
    }

    pub fn with_channels(sample_rate: u32, channels: u16) -> (Self, OfflineDriver) {
        let slot: RendererSlot = Arc::new(Mutex::new(None));
        let format = StreamFormat {
            sample_rate,
            channels: channels.max(1),
        };
        (
            Self {
                format,
                slot: Arc::clone(&slot),
                open: false,
                sample_accurate: true,
                open_failure: None,
            },
            OfflineDriver { slot, format },
        )
    }

    /// Report the callback as unsuitable for sample-domain timing.
    pub fn without_sample_clock(mut self) -> Self {
        self.sample_accurate = false;
        self
    }

    /// Make `open` fail as if no output device existed.
    pub fn unavailable(mut self, reason: impl Into<String>) -> Self {
        self.open_failure = Some(reason.into());
        self
    }
}

impl AudioBackend for OfflineBackend {
    fn open(&mut self, _preferred_sample_rate: u32) -> Result<StreamFormat, AudioError> {
        if let Some(reason) = &self.open_failure {
            return Err(AudioError::DeviceUnavailable {
                reason: reason.clone(),
            });
        }
        self.open = true;
        Ok(self.format)
    }

    fn play(&mut self, renderer: Box<dyn AudioRender>) -> Result<(), AudioError> {
        if !self.open {
            return Err(AudioError::StreamOpenFailed {
                reason: "offline backend not opened".to_string(),
            });
        }
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(renderer);
        Ok(())
    }

    fn close(&mut self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn supports_sample_accurate(&self) -> bool {
        self.sample_accurate
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

/// Pulls audio out of an [`OfflineBackend`].
#[derive(Clone)]
pub struct OfflineDriver {
    slot: RendererSlot,
    format: StreamFormat,
}

impl OfflineDriver {
    /// Render `frames` interleaved frames. Silence when no stream is playing.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let channels = self.format.channels as usize;
        let mut out = vec![0.0; frames * channels];
        if let Some(renderer) = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            renderer.render(&mut out, channels);
        }
        out
    }

    /// Render in device-sized blocks, the way a real callback would.
    pub fn render_blocks(&self, frames: usize, block: usize) -> Vec<f32> {
        let block = block.max(1);
        let mut out = Vec::with_capacity(frames * self.format.channels as usize);
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(block);
            out.extend(self.render(n));
            remaining -= n;
        }
        out
    }

    pub fn is_playing(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp(f32);

    impl AudioRender for Ramp {
        fn render(&mut self, out: &mut [f32], channels: usize) {
            for frame in out.chunks_mut(channels) {
                frame.fill(self.0);
                self.0 += 1.0;
            }
        }
    }

    #[test]
    fn driver_is_silent_until_play() {
        let (mut backend, driver) = OfflineBackend::new(48_000);
        assert!(driver.render(4).iter().all(|&s| s == 0.0));

        assert!(matches!(
            backend.play(Box::new(Ramp(1.0))),
            Err(AudioError::StreamOpenFailed { .. })
        ));

        let format = backend.open(44_100).unwrap();
        assert_eq!(format.sample_rate, 48_000, "offline rate wins over preference");
        backend.play(Box::new(Ramp(1.0))).unwrap();
        assert_eq!(driver.render(3), vec![1.0, 2.0, 3.0]);
        assert!(driver.is_playing());

        backend.close();
        backend.close();
        assert!(!backend.is_open());
        assert!(!driver.is_playing());
        assert!(driver.render(2).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn driver_interleaves_channels() {
        let (mut backend, driver) = OfflineBackend::with_channels(8_000, 2);
        backend.open(8_000).unwrap();
        backend.play(Box::new(Ramp(1.0))).unwrap();
        assert_eq!(driver.render_blocks(3, 2), vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn unavailable_backend_fails_open() {
        let (backend, _driver) = OfflineBackend::new(8_000);
        let mut backend = backend.unavailable("unplugged");
        assert!(matches!(
            backend.open(8_000),
            Err(AudioError::DeviceUnavailable { .. })
        ));
        assert!(!backend.is_open());
    }
}
