use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use native_metronome::audio::metronome::to_pcm16;
use native_metronome::audio::{ClickWaveform, MAX_BPM};
use native_metronome::config::{AppConfig, RenderMode};
use native_metronome::engine::{EngineHandle, OfflineBackend};
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(
    name = "metronome_cli",
    about = "Render, play and inspect the native metronome engine"
)]
struct Cli {
    /// Configuration file (defaults to the bundled configuration)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the metronome offline into a 16-bit mono WAV file
    Render {
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        #[arg(long, default_value_t = 4.0)]
        seconds: f64,
        #[arg(long, default_value_t = 44_100)]
        sample_rate: u32,
        /// Tempo change as SECONDS:BPM, may be repeated
        #[arg(long = "tempo-change", value_parser = parse_tempo_change)]
        tempo_changes: Vec<TempoChange>,
    },
    /// Play through the default output device and print beat events
    Play {
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
        #[arg(long)]
        vibrate: bool,
        /// Use the timer-driven one-shot voice instead of sample-accurate rendering
        #[arg(long)]
        discrete: bool,
    },
    /// Describe the click waveform, optionally writing it to a WAV file
    Waveform {
        #[arg(long, default_value_t = 44_100)]
        sample_rate: u32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy)]
struct TempoChange {
    at_seconds: f64,
    bpm: f64,
}

fn parse_tempo_change(raw: &str) -> Result<TempoChange, String> {
    let (at, bpm) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected SECONDS:BPM, got '{}'", raw))?;
    let at_seconds: f64 = at
        .trim()
        .parse()
        .map_err(|_| format!("invalid seconds '{}'", at))?;
    let bpm: f64 = bpm
        .trim()
        .parse()
        .map_err(|_| format!("invalid bpm '{}'", bpm))?;
    if !at_seconds.is_finite() || at_seconds < 0.0 {
        return Err(format!("seconds must be >= 0 (got {})", at_seconds));
    }
    Ok(TempoChange { at_seconds, bpm })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WaveformReport {
    sample_rate: u32,
    samples: usize,
    duration_ms: f64,
    peak: f32,
    last_sample: f32,
}

fn main() -> ExitCode {
    native_metronome::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Render {
            output,
            bpm,
            seconds,
            sample_rate,
            tempo_changes,
        } => run_render(config, &output, bpm, seconds, sample_rate, tempo_changes),
        Commands::Play {
            bpm,
            seconds,
            vibrate,
            discrete,
        } => {
            let mut config = config;
            if discrete {
                config.audio.mode = RenderMode::Discrete;
            }
            run_play(config, bpm, seconds, vibrate)
        }
        Commands::Waveform {
            sample_rate,
            output,
        } => run_waveform(&config, sample_rate, output.as_deref()),
    }
}

/// Beats a render can produce, with headroom for the first beat and rounding.
fn expected_beats(bpm: f64, seconds: f64, tempo_changes: &[TempoChange]) -> usize {
    let fastest = tempo_changes
        .iter()
        .map(|change| change.bpm)
        .fold(bpm, f64::max)
        .clamp(0.0, MAX_BPM);
    (fastest / 60.0 * seconds).ceil() as usize + 2
}

fn run_render(
    mut config: AppConfig,
    output: &Path,
    bpm: f64,
    seconds: f64,
    sample_rate: u32,
    mut tempo_changes: Vec<TempoChange>,
) -> Result<ExitCode> {
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("--seconds must be greater than 0");
    }
    const BLOCK: usize = 512;

    // Offline rendering outruns the dispatcher, so both queues must hold
    // every beat of the run.
    let beat_capacity = expected_beats(bpm, seconds, &tempo_changes);
    config.audio.event_queue_capacity = config.audio.event_queue_capacity.max(beat_capacity);
    config.audio.event_channel_capacity = config.audio.event_channel_capacity.max(beat_capacity);

    let (backend, driver) = OfflineBackend::new(sample_rate);
    let engine = EngineHandle::with_backend(config, Box::new(backend));
    let mut beats = engine.subscribe_beats();

    engine.start(bpm, false).context("starting metronome")?;

    tempo_changes.sort_by(|a, b| a.at_seconds.total_cmp(&b.at_seconds));
    let mut pending = tempo_changes
        .into_iter()
        .map(|change| ((change.at_seconds * sample_rate as f64).round() as usize, change.bpm))
        .peekable();

    let total = (seconds * sample_rate as f64).round() as usize;
    let mut samples = Vec::with_capacity(total);
    let mut events = Vec::new();
    while samples.len() < total {
        while let Some((_, new_bpm)) = pending.next_if(|(at, _)| *at <= samples.len()) {
            engine
                .set_tempo(new_bpm)
                .with_context(|| format!("changing tempo to {}", new_bpm))?;
        }
        // Stop the block at the next tempo change so it lands on its frame
        let limit = pending.peek().map_or(total, |(at, _)| (*at).min(total));
        let frames = (limit - samples.len()).clamp(1, BLOCK);
        samples.extend(driver.render(frames));
        events.extend(drain(&mut beats));
    }

    engine.shutdown().context("releasing offline stream")?;
    events.extend(drain(&mut beats));
    write_wav(output, sample_rate, samples.iter().map(|s| to_pcm16(*s)))?;

    for event in events {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(ExitCode::from(0))
}

fn run_play(config: AppConfig, bpm: f64, seconds: f64, vibrate: bool) -> Result<ExitCode> {
    let engine = EngineHandle::with_backend(
        config,
        native_metronome::engine::platform_backend(),
    );
    let mut beats = engine.subscribe_beats();
    let mut haptics = engine.subscribe_haptics();

    engine.start(bpm, vibrate).context("starting metronome")?;
    if let Some(mode) = engine.render_mode() {
        eprintln!("playing at {} BPM ({:?} mode), Ctrl-C to abort", bpm, mode);
    }

    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    while Instant::now() < deadline {
        for event in drain(&mut beats) {
            println!("{}", serde_json::to_string(&event)?);
        }
        for pulse in drain(&mut haptics) {
            println!("{}", serde_json::to_string(&pulse)?);
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    engine.shutdown().context("stopping metronome")?;
    for event in drain(&mut beats) {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(ExitCode::from(0))
}

fn run_waveform(config: &AppConfig, sample_rate: u32, output: Option<&Path>) -> Result<ExitCode> {
    let click = ClickWaveform::new(sample_rate, &config.click);
    if click.is_empty() {
        bail!("click waveform is empty; check the click duration and sample rate");
    }

    if let Some(path) = output {
        write_wav(path, sample_rate, click.to_pcm16())?;
    }

    let report = WaveformReport {
        sample_rate,
        samples: click.len(),
        duration_ms: click.len() as f64 * 1000.0 / sample_rate as f64,
        peak: click.peak(),
        last_sample: click.samples().last().copied().unwrap_or(0.0),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

fn write_wav(path: &Path, sample_rate: u32, samples: impl IntoIterator<Item = i16>) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for sample in samples {
        writer.write_sample(sample)?;
    }
    writer
        .finalize()
        .with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(item) => out.push(item),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                eprintln!("warning: skipped {} events", skipped);
            }
            Err(_) => break,
        }
    }
    out
}

