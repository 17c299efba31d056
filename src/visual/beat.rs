//! Adaptive-threshold onset detection on sub-bass energy.

use std::collections::VecDeque;
use std::ops::Range;

pub const HISTORY_LEN: usize = 30;
/// Instant energy must exceed the local average by this factor.
pub const ONSET_RATIO: f32 = 1.3;
/// Absolute floor on the 0-255 byte scale.
pub const ONSET_FLOOR: f32 = 100.0;
pub const REFRACTORY_MS: f64 = 250.0;
/// Analyser bins treated as sub-bass; bin 0 is DC.
pub const SUB_BASS_BINS: Range<usize> = 1..12;

const ENERGY_DECAY: f32 = 0.85;
const ONSET_KICK: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatReading {
    pub instant: f32,
    pub local_average: f32,
    pub onset: bool,
    /// Smoothed energy reported upward every frame; roughly 0-1, not clamped.
    pub energy: f32,
}

#[derive(Debug, Clone, Default)]
pub struct BeatDetector {
    history: VecDeque<f32>,
    last_onset_ms: Option<f64>,
    energy: f32,
}

impl BeatDetector {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
            ..Self::default()
        }
    }

    /// Reads the sub-bass range out of a byte spectrum and updates.
    pub fn update(&mut self, bins: &[u8], now_ms: f64) -> BeatReading {
        self.push_energy(sub_bass_energy(bins), now_ms)
    }

    pub fn push_energy(&mut self, instant: f32, now_ms: f64) -> BeatReading {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(instant);
        let local_average = self.history.iter().sum::<f32>() / self.history.len() as f32;

        let rested = self
            .last_onset_ms
            .map_or(true, |last| now_ms - last > REFRACTORY_MS);
        let onset = instant > local_average * ONSET_RATIO && instant > ONSET_FLOOR && rested;
        if onset {
            self.last_onset_ms = Some(now_ms);
        }

        let level = instant / 255.0;
        self.energy = self.energy * ENERGY_DECAY + level * (1.0 - ENERGY_DECAY);
        if onset {
            self.energy += level * ONSET_KICK;
        }

        BeatReading {
            instant,
            local_average,
            onset,
            energy: self.energy,
        }
    }

    pub fn energy(&self) -> f32 {
        self.energy
    }

    pub fn last_onset_ms(&self) -> Option<f64> {
        self.last_onset_ms
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_onset_ms = None;
        self.energy = 0.0;
    }
}

/// Mean of the sub-bass bins present in `bins`.
pub fn sub_bass_energy(bins: &[u8]) -> f32 {
    let end = SUB_BASS_BINS.end.min(bins.len());
    let start = SUB_BASS_BINS.start.min(end);
    let slice = &bins[start..end];
    if slice.is_empty() {
        return 0.0;
    }
    slice.iter().map(|&b| b as f32).sum::<f32>() / slice.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_MS: f64 = 1000.0 / 60.0;

    fn feed_flat(detector: &mut BeatDetector, level: f32, frames: usize) -> (usize, f64) {
        let mut onsets = 0;
        let mut t = 0.0;
        for _ in 0..frames {
            onsets += detector.push_energy(level, t).onset as usize;
            t += FRAME_MS;
        }
        (onsets, t)
    }

    #[test]
    fn single_spike_after_flat_fires_once() {
        let mut detector = BeatDetector::new();
        let (onsets, mut t) = feed_flat(&mut detector, 50.0, 40);
        assert_eq!(onsets, 0);

        let mut fired = detector.push_energy(200.0, t).onset as usize;
        for _ in 0..20 {
            t += FRAME_MS;
            fired += detector.push_energy(50.0, t).onset as usize;
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn spikes_inside_refractory_fire_once() {
        let mut detector = BeatDetector::new();
        let (_, t) = feed_flat(&mut detector, 50.0, 40);
        let first = detector.push_energy(200.0, t).onset;
        detector.push_energy(50.0, t + 50.0);
        let second = detector.push_energy(200.0, t + 100.0).onset;
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn spikes_past_refractory_fire_twice() {
        let mut detector = BeatDetector::new();
        let (_, t) = feed_flat(&mut detector, 50.0, 40);
        let first = detector.push_energy(200.0, t).onset;
        detector.push_energy(50.0, t + 150.0);
        let second = detector.push_energy(200.0, t + 300.0).onset;
        assert!(first);
        assert!(second);
    }

    #[test]
    fn loud_flat_passage_never_fires() {
        let mut detector = BeatDetector::new();
        let (onsets, _) = feed_flat(&mut detector, 220.0, 200);
        assert_eq!(onsets, 0);
    }

    #[test]
    fn quiet_spike_is_below_floor() {
        let mut detector = BeatDetector::new();
        let (_, t) = feed_flat(&mut detector, 10.0, 40);
        assert!(!detector.push_energy(90.0, t).onset);
    }

    #[test]
    fn energy_rises_on_onset_and_decays() {
        let mut detector = BeatDetector::new();
        let (_, t) = feed_flat(&mut detector, 0.0, 10);
        let hit = detector.push_energy(255.0, t);
        assert!(hit.onset);
        assert!((hit.energy - (0.15 + 0.25)).abs() < 1e-6);
        let after = detector.push_energy(0.0, t + FRAME_MS);
        assert!((after.energy - hit.energy * 0.85).abs() < 1e-6);
    }

    #[test]
    fn reads_sub_bass_bins_only() {
        let mut bins = vec![0u8; 64];
        bins[0] = 255;
        bins[1..12].fill(110);
        bins[12..].fill(255);
        assert_eq!(sub_bass_energy(&bins), 110.0);
        assert_eq!(sub_bass_energy(&bins[..1]), 0.0);
        assert_eq!(sub_bass_energy(&[]), 0.0);
    }

    #[test]
    fn reset_forgets_history() {
        let mut detector = BeatDetector::new();
        let (_, t) = feed_flat(&mut detector, 50.0, 40);
        assert!(detector.push_energy(200.0, t).onset);
        detector.reset();
        assert_eq!(detector.last_onset_ms(), None);
        assert_eq!(detector.energy(), 0.0);
        feed_flat(&mut detector, 50.0, 5);
        assert!(detector.push_energy(200.0, 10.0).onset);
    }
}
