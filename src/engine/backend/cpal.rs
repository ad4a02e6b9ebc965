//! CPAL output backend for desktop platforms (Linux, macOS, Windows)
//!
//! `cpal::Stream` is not `Send`, so the stream is built, played and dropped
//! on a dedicated thread. The backend keeps only a stop channel and the
//! join handle.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::metronome::to_pcm16;
use crate::audio::AudioRender;
use crate::error::{log_audio_error, AudioError};

use super::{AudioBackend, StreamFormat};

/// Scratch capacity for i16 devices. Larger callbacks render in chunks.
const I16_SCRATCH_FRAMES: usize = 8192;

struct StreamWorker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct CpalBackend {
    format: Option<StreamFormat>,
    /// Device and config chosen by `open`, handed to the output thread by `play`.
    output: Option<(cpal::Device, cpal::SupportedStreamConfig)>,
    worker: Option<StreamWorker>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Default output device and a config honouring `preferred` when supported.
fn resolve_output(
    preferred: u32,
) -> Result<(cpal::Device, cpal::SupportedStreamConfig), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceUnavailable {
            reason: "No default output device found".to_string(),
        })?;

    let preferred_rate = cpal::SampleRate(preferred);
    let matching = device.supported_output_configs().ok().and_then(|mut ranges| {
        ranges.find(|range| {
            range.sample_format() == cpal::SampleFormat::F32
                && range.min_sample_rate() <= preferred_rate
                && range.max_sample_rate() >= preferred_rate
        })
    });

    let config = match matching {
        Some(range) => range.with_sample_rate(preferred_rate),
        None => device
            .default_output_config()
            .map_err(|e| AudioError::DeviceUnavailable {
                reason: format!("Failed to get default output config: {:?}", e),
            })?,
    };

    Ok((device, config))
}

/// Render into `data` through the f32 `scratch`, one frame-aligned chunk
/// at a time, so callbacks larger than the scratch never allocate.
fn render_i16(
    renderer: &mut dyn AudioRender,
    scratch: &mut [f32],
    data: &mut [i16],
    channels: usize,
) {
    let chunk = (scratch.len() / channels * channels).max(channels);
    for out in data.chunks_mut(chunk) {
        let block = &mut scratch[..out.len()];
        renderer.render(block, channels);
        for (sample_out, &sample) in out.iter_mut().zip(block.iter()) {
            *sample_out = to_pcm16(sample);
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::SupportedStreamConfig,
    mut renderer: Box<dyn AudioRender>,
) -> Result<cpal::Stream, AudioError> {
    let stream_config: cpal::StreamConfig = config.config();
    let channels = stream_config.channels as usize;
    let err_fn = |err| log::error!("[Cpal] Output stream error: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                renderer.render(data, channels);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => {
            let mut scratch = vec![0.0_f32; I16_SCRATCH_FRAMES * channels];
            device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    render_i16(&mut *renderer, &mut scratch, data, channels);
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(AudioError::StreamOpenFailed {
                reason: format!("Unsupported output sample format {:?}", other),
            })
        }
    }
    .map_err(|e| AudioError::StreamOpenFailed {
        reason: format!("{:?}", e),
    })?;

    Ok(stream)
}

impl AudioBackend for CpalBackend {
    fn open(&mut self, preferred_sample_rate: u32) -> Result<StreamFormat, AudioError> {
        if let Some(format) = self.format {
            return Ok(format);
        }

        let (device, config) = resolve_output(preferred_sample_rate)?;
        let format = StreamFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };
        log::info!(
            "[Cpal] Using output device {:?} at {} Hz, {} channel(s), {:?}",
            device.name().unwrap_or_default(),
            format.sample_rate,
            format.channels,
            config.sample_format()
        );

        self.output = Some((device, config));
        self.format = Some(format);
        Ok(format)
    }

    fn play(&mut self, renderer: Box<dyn AudioRender>) -> Result<(), AudioError> {
        if self.worker.is_some() {
            return Err(AudioError::AlreadyRunning);
        }
        let (device, config) = self.output.take().ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "open() must be called before play()".to_string(),
        })?;

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), AudioError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name("metronome-output".to_string())
            .spawn(move || {
                let started = build_stream(&device, &config, renderer).and_then(|stream| {
                    stream.play().map_err(|e| AudioError::HardwareError {
                        details: format!("Failed to start output stream: {:?}", e),
                    })?;
                    Ok(stream)
                });

                match started {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Blocks until close() sends or drops the sender.
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })?;

        let result = ready_rx.recv().unwrap_or_else(|_| {
            Err(AudioError::HardwareError {
                details: "Output thread exited before the stream started".to_string(),
            })
        });

        match result {
            Ok(()) => {
                self.worker = Some(StreamWorker { stop_tx, handle });
                Ok(())
            }
            Err(err) => {
                let _ = handle.join();
                log_audio_error(&err, "cpal_play");
                Err(err)
            }
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                log::error!("[Cpal] Output thread panicked");
            }
        }
        self.output = None;
        self.format = None;
    }

    fn is_open(&self) -> bool {
        self.format.is_some()
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes a running frame counter into every channel.
    struct FrameCounter {
        next: usize,
        calls: usize,
    }

    impl AudioRender for FrameCounter {
        fn render(&mut self, out: &mut [f32], channels: usize) {
            self.calls += 1;
            for frame in out.chunks_mut(channels) {
                frame.fill(self.next as f32 / 1_000.0);
                self.next += 1;
            }
        }
    }

    #[test]
    fn test_i16_callback_larger_than_scratch_renders_in_chunks() {
        let channels = 2;
        let mut renderer = FrameCounter { next: 0, calls: 0 };
        let mut scratch = vec![0.0_f32; 4 * channels];
        let mut data = vec![0_i16; 10 * channels];

        render_i16(&mut renderer, &mut scratch, &mut data, channels);

        assert_eq!(scratch.len(), 4 * channels, "scratch never grows");
        assert_eq!(renderer.calls, 3);
        assert_eq!(renderer.next, 10);
        for (frame, samples) in data.chunks(channels).enumerate() {
            let expected = to_pcm16(frame as f32 / 1_000.0);
            assert_eq!(samples.to_vec(), vec![expected, expected], "frame {}", frame);
        }
    }

    #[test]
    fn test_i16_callback_within_scratch_renders_once() {
        let mut renderer = FrameCounter { next: 0, calls: 0 };
        let mut scratch = vec![0.0_f32; 8];
        let mut data = vec![0_i16; 3];

        render_i16(&mut renderer, &mut scratch, &mut data, 1);

        assert_eq!(renderer.calls, 1);
        assert_eq!(data, vec![0, to_pcm16(0.001), to_pcm16(0.002)]);
    }

    #[test]
    fn test_play_without_open_is_rejected() {
        let mut backend = CpalBackend::new();
        let renderer = Box::new(FrameCounter { next: 0, calls: 0 });
        assert!(matches!(
            backend.play(renderer),
            Err(AudioError::StreamOpenFailed { .. })
        ));
        assert!(!backend.is_open());
    }
}
