//! Oboe output backend for Android (AAudio / OpenSL ES).

use oboe::{
    AudioOutputCallback, AudioOutputStreamSafe, AudioStream, AudioStreamAsync,
    AudioStreamBuilder, DataCallbackResult, Output, PerformanceMode, SharingMode,
};

use crate::audio::AudioRender;
use crate::error::{log_audio_error, AudioError};

use super::{AudioBackend, StreamFormat};

/// Oboe callback forwarding each mono buffer to the renderer.
struct MetronomeOutput {
    renderer: Box<dyn AudioRender>,
}

impl AudioOutputCallback for MetronomeOutput {
    type FrameType = (f32, oboe::Mono);

    fn on_audio_ready(
        &mut self,
        _stream: &mut dyn AudioOutputStreamSafe,
        frames: &mut [f32],
    ) -> DataCallbackResult {
        self.renderer.render(frames, 1);
        DataCallbackResult::Continue
    }
}

#[derive(Default)]
pub struct OboeBackend {
    sample_rate: Option<u32>,
    stream: Option<AudioStreamAsync<Output, MetronomeOutput>>,
}

impl OboeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for OboeBackend {
    fn open(&mut self, preferred_sample_rate: u32) -> Result<StreamFormat, AudioError> {
        let sample_rate = *self.sample_rate.get_or_insert(preferred_sample_rate);
        Ok(StreamFormat {
            sample_rate,
            channels: 1,
        })
    }

    fn play(&mut self, renderer: Box<dyn AudioRender>) -> Result<(), AudioError> {
        let sample_rate = self.sample_rate.ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "open() must be called before play()".to_string(),
        })?;
        if self.stream.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        let mut stream = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::LowLatency)
            .set_sharing_mode(SharingMode::Shared)
            .set_direction::<Output>()
            .set_sample_rate(sample_rate as i32)
            .set_channel_count::<oboe::Mono>()
            .set_format::<f32>()
            .set_callback(MetronomeOutput { renderer })
            .open_stream()
            .map_err(|e| AudioError::DeviceUnavailable {
                reason: format!("Output stream: {:?}", e),
            })?;

        stream.start().map_err(|e| {
            let err = AudioError::HardwareError {
                details: format!("Failed to start output stream: {:?}", e),
            };
            log_audio_error(&err, "oboe_play");
            err
        })?;

        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                log::warn!("[Oboe] Failed to stop output stream: {:?}", e);
            }
        }
        self.sample_rate = None;
    }

    fn is_open(&self) -> bool {
        self.sample_rate.is_some()
    }

    fn name(&self) -> &'static str {
        "oboe"
    }
}
