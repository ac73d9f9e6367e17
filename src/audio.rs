// ============================================================================
// AUDIO LEVEL — latest amplitude published by whatever analyses the music
// ============================================================================
//
// The particle engine never sees audio samples, only one normalized scalar
// per frame.  Producers (an analyser thread, a UI slider, a CLI flag) store
// into the handle whenever they like; the frame loop reads the newest value
// without waiting.  Stale reads are fine.
// ============================================================================

use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Shared, lock-free audio level.  Cloning shares the same slot.
#[derive(Clone, Debug, Default)]
pub struct AudioLevel {
    bits: Arc<AtomicU32>,
}

impl AudioLevel {
    pub fn new(initial: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(initial.to_bits())),
        }
    }

    /// Publish a new level.  Not clamped; the analyser owns the range.
    pub fn store(&self, level: f32) {
        self.bits.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Most recently published level.
    pub fn latest(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Synthetic beat envelope for demos without a real analyser: a sharp attack
/// on every beat decaying toward a low floor, in `[0, 1]`.
pub fn pulse_level(t: f32, bpm: f32) -> f32 {
    if bpm <= 0.0 {
        return 0.0;
    }
    let beat = t * bpm / 60.0;
    let phase = beat - beat.floor();
    let envelope = (-phase * 6.0).exp();
    let shimmer = 0.5 + 0.5 * (beat * TAU * 0.25).sin();
    (0.15 + 0.85 * envelope) * (0.7 + 0.3 * shimmer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_slot() {
        let producer = AudioLevel::new(0.0);
        let consumer = producer.clone();
        producer.store(0.42);
        assert_eq!(consumer.latest(), 0.42);
    }

    #[test]
    fn store_from_another_thread() {
        let level = AudioLevel::default();
        let producer = level.clone();
        std::thread::spawn(move || producer.store(0.9)).join().unwrap();
        assert_eq!(level.latest(), 0.9);
    }

    #[test]
    fn pulse_stays_normalized_and_peaks_on_beats() {
        for k in 0..1000 {
            let v = pulse_level(k as f32 * 0.013, 120.0);
            assert!((0.0..=1.0).contains(&v), "{v}");
        }
        // 120 bpm: beats at 0.0, 0.5, 1.0 s
        assert!(pulse_level(0.5, 120.0) > pulse_level(0.9, 120.0));
        assert_eq!(pulse_level(1.0, 0.0), 0.0);
    }
}
