// BroadcastChannelManager: host-facing event channels
// Single Responsibility: Broadcast channel lifecycle and subscription

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

use crate::api::{BeatEvent, HapticPulse};

/// Manages the tokio broadcast channels that carry engine notifications
///
/// # Channel Types
/// - Beats: one `BeatEvent` per fired beat, in beat order
/// - Haptics: one `HapticPulse` per beat while vibration is enabled
///
/// Slow subscribers lag and lose the oldest messages; the dispatcher never
/// waits for them.
pub struct BroadcastChannelManager {
    beats: Arc<Mutex<Option<broadcast::Sender<BeatEvent>>>>,
    haptics: Arc<Mutex<Option<broadcast::Sender<HapticPulse>>>>,
}

impl BroadcastChannelManager {
    /// Create a manager with all channels uninitialized
    pub fn new() -> Self {
        Self {
            beats: Arc::new(Mutex::new(None)),
            haptics: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // BEAT CHANNEL
    // ========================================================================

    /// Initialize the beat channel, replacing any previous sender
    pub fn init_beats(&self, capacity: usize) -> broadcast::Sender<BeatEvent> {
        let (tx, _) = broadcast::channel(capacity.max(1));
        *self.beats.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx.clone());
        tx
    }

    /// Sender for the beat channel, or None if not initialized
    pub fn beat_sender(&self) -> Option<broadcast::Sender<BeatEvent>> {
        self.beats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to beat events
    ///
    /// Returns None if init_beats() has not been called yet.
    pub fn subscribe_beats(&self) -> Option<broadcast::Receiver<BeatEvent>> {
        self.beats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|tx| tx.subscribe())
    }

    // ========================================================================
    // HAPTIC CHANNEL
    // ========================================================================

    /// Initialize the haptic channel, replacing any previous sender
    pub fn init_haptics(&self, capacity: usize) -> broadcast::Sender<HapticPulse> {
        let (tx, _) = broadcast::channel(capacity.max(1));
        *self.haptics.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx.clone());
        tx
    }

    pub fn haptic_sender(&self) -> Option<broadcast::Sender<HapticPulse>> {
        self.haptics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to haptic pulse requests
    pub fn subscribe_haptics(&self) -> Option<broadcast::Receiver<HapticPulse>> {
        self.haptics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|tx| tx.subscribe())
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_before_init_returns_none() {
        let manager = BroadcastChannelManager::new();
        assert!(manager.subscribe_beats().is_none());
        assert!(manager.subscribe_haptics().is_none());
        assert!(manager.beat_sender().is_none());
    }

    #[test]
    fn test_all_subscribers_receive_beats() {
        let manager = BroadcastChannelManager::new();
        let tx = manager.init_beats(8);
        let mut rx1 = manager.subscribe_beats().unwrap();
        let mut rx2 = manager.subscribe_beats().unwrap();

        let event = BeatEvent {
            beat_count: Some(1),
            timestamp_millis: 10,
            current_bpm: 120.0,
        };
        tx.send(event.clone()).unwrap();

        assert_eq!(rx1.try_recv().unwrap(), event);
        assert_eq!(rx2.try_recv().unwrap(), event);
    }

    #[test]
    fn test_haptic_channel_independent_of_beats() {
        let manager = BroadcastChannelManager::new();
        manager.init_beats(4);
        let tx = manager.init_haptics(4);
        let mut beats = manager.subscribe_beats().unwrap();
        let mut haptics = manager.subscribe_haptics().unwrap();

        tx.send(HapticPulse { duration_ms: 15 }).unwrap();
        assert_eq!(haptics.try_recv().unwrap().duration_ms, 15);
        assert!(beats.try_recv().is_err());
    }
}
