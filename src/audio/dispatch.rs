//! Beat event hand-off from the rendering domain to the host.
//!
//! The render callback (or discrete scheduler) pushes [`EngineEvent`]s into
//! a lock-free SPSC ring buffer. A dedicated dispatcher thread drains it,
//! stamps wall-clock time and fans events out on broadcast channels.
//! A full queue drops the event and counts it; the producer never blocks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rtrb::{Consumer, Producer, RingBuffer};
use tokio::sync::broadcast;

use crate::api::{BeatEvent, HapticPulse};
use crate::audio::clock::{BeatTick, ClockDomain};
use crate::error::AudioError;
use crate::telemetry::{self, OverflowTracker};

/// Idle poll period of the dispatcher thread.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Event produced inside the rendering domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    Beat {
        beat_count: u64,
        bpm: f64,
        skipped: u64,
        lateness_ms: f64,
    },
    Haptic {
        duration_ms: u32,
    },
}

impl EngineEvent {
    pub fn beat(tick: &BeatTick, domain: ClockDomain) -> Self {
        EngineEvent::Beat {
            beat_count: tick.beat_count,
            bpm: tick.bpm,
            skipped: tick.skipped,
            lateness_ms: domain.to_millis(tick.lateness),
        }
    }
}

/// Producer half, owned by whoever polls the beat clock.
pub struct EventPublisher {
    producer: Producer<EngineEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventPublisher {
    /// Enqueue without blocking. Returns `false` if the queue was full.
    #[inline]
    pub fn publish(&mut self, event: EngineEvent) -> bool {
        match self.producer.push(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half, handed to [`EventDispatcher::spawn`].
pub struct EventQueue {
    consumer: Consumer<EngineEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventQueue {
    /// Pop the next pending event, if any.
    pub fn pop(&mut self) -> Option<EngineEvent> {
        self.consumer.pop().ok()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a bounded event queue.
pub fn event_queue(capacity: usize) -> (EventPublisher, EventQueue) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventPublisher {
            producer,
            dropped: Arc::clone(&dropped),
        },
        EventQueue { consumer, dropped },
    )
}

/// Host-facing sinks the dispatcher delivers into.
#[derive(Clone)]
pub struct EventSinks {
    pub beats: broadcast::Sender<BeatEvent>,
    pub haptics: broadcast::Sender<HapticPulse>,
}

/// Deliver a single event. Send errors only mean "no subscriber".
fn deliver(event: EngineEvent, sinks: &EventSinks) {
    match event {
        EngineEvent::Beat {
            beat_count,
            bpm,
            skipped,
            lateness_ms,
        } => {
            let hub = telemetry::hub();
            hub.record_beat_lateness(lateness_ms as f32);
            hub.record_skipped_beats(skipped, beat_count);

            let _ = sinks.beats.send(BeatEvent {
                beat_count: Some(beat_count),
                timestamp_millis: telemetry::now_timestamp_ms(),
                current_bpm: bpm,
            });
        }
        EngineEvent::Haptic { duration_ms } => {
            let _ = sinks.haptics.send(HapticPulse { duration_ms });
        }
    }
}

/// Non-real-time thread draining the event queue.
pub struct EventDispatcher {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    pub fn spawn(mut queue: EventQueue, sinks: EventSinks) -> Result<Self, AudioError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = std::thread::Builder::new()
            .name("metronome-dispatch".to_string())
            .spawn(move || {
                log::debug!("[Dispatch] Event dispatcher started");
                let mut overflow = OverflowTracker::default();
                loop {
                    // Read the flag before draining so nothing queued before
                    // shutdown is lost.
                    let stopping = flag.load(Ordering::Acquire);

                    let mut delivered = 0usize;
                    while let Some(event) = queue.pop() {
                        deliver(event, &sinks);
                        delivered += 1;
                    }
                    telemetry::hub().record_queue_overflow(overflow.take_new(queue.dropped()));

                    if stopping {
                        break;
                    }
                    if delivered == 0 {
                        std::thread::sleep(IDLE_SLEEP);
                    }
                }
                log::debug!("[Dispatch] Event dispatcher exited");
            })?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Drain outstanding events, then join the thread.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[Dispatch] Event dispatcher thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
