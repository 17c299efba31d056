//! Playable media handle.
//!
//! A [`MediaElement`] owns decoded stereo PCM together with its playback rate
//! and playhead. The engine reads from it; callers keep their own clone and
//! may change the rate or seek at any time from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::decode::AudioData;
use crate::graph::param::AtomicF32;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct MediaShared {
    id: u64,
    left: Vec<f32>,
    right: Vec<f32>,
    sample_rate: u32,
    rate: AtomicF32,
    /// Playhead in source frames, stored as `f64` bits.
    position: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct MediaElement {
    shared: Arc<MediaShared>,
}

impl MediaElement {
    pub fn new(audio: AudioData) -> Self {
        let AudioData {
            left,
            right,
            sample_rate,
        } = audio;
        Self::from_channels(left, right, sample_rate)
    }

    pub fn from_channels(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Self {
        let frames = left.len().min(right.len());
        let (mut left, mut right) = (left, right);
        left.truncate(frames);
        right.truncate(frames);

        Self {
            shared: Arc::new(MediaShared {
                id: NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed),
                left,
                right,
                sample_rate,
                rate: AtomicF32::new(1.0),
                position: AtomicU64::new(0f64.to_bits()),
            }),
        }
    }

    /// Identity of the underlying media, shared by all clones.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.shared.left.len()
    }

    pub fn duration(&self) -> f64 {
        if self.shared.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.shared.sample_rate as f64
    }

    pub fn playback_rate(&self) -> f32 {
        self.shared.rate.load()
    }

    /// Negative and non-finite rates stop the playhead.
    pub fn set_playback_rate(&self, rate: f32) {
        let rate = if rate.is_finite() { rate.max(0.0) } else { 0.0 };
        self.shared.rate.store(rate);
    }

    /// Playhead position in seconds of source media.
    pub fn current_time(&self) -> f64 {
        if self.shared.sample_rate == 0 {
            return 0.0;
        }
        self.position() / self.shared.sample_rate as f64
    }

    pub fn seek(&self, seconds: f64) {
        let frame = (seconds.max(0.0) * self.shared.sample_rate as f64).min(self.frames() as f64);
        self.set_position(frame);
    }

    pub fn ended(&self) -> bool {
        self.position() >= self.frames() as f64
    }

    /// Fills `left`/`right` with interpolated source frames at `context_rate`
    /// and returns how many frames came from the media. The remainder is
    /// zeroed.
    pub fn read_into(&self, left: &mut [f32], right: &mut [f32], context_rate: u32) -> usize {
        let wanted = left.len().min(right.len());
        left.fill(0.0);
        right.fill(0.0);

        let total = self.frames();
        if total == 0 || context_rate == 0 {
            return 0;
        }

        let step = self.playback_rate() as f64 * self.shared.sample_rate as f64 / context_rate as f64;
        let src_left = &self.shared.left;
        let src_right = &self.shared.right;

        let mut position = self.position();
        let mut produced = 0;
        for i in 0..wanted {
            if position >= total as f64 {
                break;
            }
            let index = position as usize;
            let frac = (position - index as f64) as f32;
            let next = (index + 1).min(total - 1);
            left[i] = src_left[index] + (src_left[next] - src_left[index]) * frac;
            right[i] = src_right[index] + (src_right[next] - src_right[index]) * frac;
            position += step;
            produced += 1;
        }

        self.set_position(position.min(total as f64));
        produced
    }

    fn position(&self) -> f64 {
        f64::from_bits(self.shared.position.load(Ordering::Acquire))
    }

    fn set_position(&self, frame: f64) {
        self.shared.position.store(frame.to_bits(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> MediaElement {
        let left: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        let right: Vec<f32> = (0..frames).map(|i| -(i as f32)).collect();
        MediaElement::from_channels(left, right, 100)
    }

    #[test]
    fn ids_are_unique_and_shared_by_clones() {
        let a = ramp(4);
        let b = ramp(4);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn unit_rate_reads_frames_verbatim() {
        let media = ramp(10);
        let (mut l, mut r) = (vec![0.0; 4], vec![0.0; 4]);
        assert_eq!(media.read_into(&mut l, &mut r, 100), 4);
        assert_eq!(l, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(r, vec![0.0, -1.0, -2.0, -3.0]);
        assert!((media.current_time() - 0.04).abs() < 1e-9);
    }

    #[test]
    fn half_rate_interpolates() {
        let media = ramp(10);
        media.set_playback_rate(0.5);
        let (mut l, mut r) = (vec![0.0; 4], vec![0.0; 4]);
        media.read_into(&mut l, &mut r, 100);
        assert_eq!(l, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn resamples_to_context_rate() {
        let media = ramp(10);
        let (mut l, mut r) = (vec![0.0; 3], vec![0.0; 3]);
        media.read_into(&mut l, &mut r, 50);
        assert_eq!(l, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn zero_fills_after_end() {
        let media = ramp(3);
        let (mut l, mut r) = (vec![9.0; 5], vec![9.0; 5]);
        assert_eq!(media.read_into(&mut l, &mut r, 100), 3);
        assert_eq!(&l[3..], &[0.0, 0.0]);
        assert!(media.ended());
        assert_eq!(media.read_into(&mut l, &mut r, 100), 0);
    }

    #[test]
    fn seek_moves_and_clamps_the_playhead() {
        let media = ramp(10);
        media.seek(0.05);
        assert_eq!(media.current_time(), 0.05);
        let (mut l, mut r) = (vec![0.0; 2], vec![0.0; 2]);
        media.read_into(&mut l, &mut r, 100);
        assert_eq!(l, vec![5.0, 6.0]);

        media.seek(-1.0);
        assert_eq!(media.current_time(), 0.0);
        media.seek(99.0);
        assert!(media.ended());
    }

    #[test]
    fn rejects_negative_rate() {
        let media = ramp(4);
        media.set_playback_rate(-2.0);
        assert_eq!(media.playback_rate(), 0.0);
        media.set_playback_rate(f32::NAN);
        assert_eq!(media.playback_rate(), 0.0);
    }
}
