//! Passthrough spectrum analyser.
//!
//! The node down-mixes each block to mono into a ring holding the most recent
//! `fft_size` frames. Readers get the byte-scaled, time-smoothed magnitude
//! spectrum through an [`AnalyserTap`]. The spectrum is recomputed at most once
//! per processed block: two reads with no audio in between see the same
//! snapshot and do not advance the smoothing.

use std::f32::consts::PI;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::graph::{AudioNode, NodeKind, NodeTaps, ProcessContext, StereoBlock};

pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;

struct AnalyserCore {
    fft_size: usize,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    ring: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
    generation: u64,
    computed: Option<u64>,
}

impl AnalyserCore {
    fn new(fft_size: usize, smoothing: f32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            min_db: DEFAULT_MIN_DECIBELS,
            max_db: DEFAULT_MAX_DECIBELS,
            ring: vec![0.0; fft_size],
            write_pos: 0,
            window: blackman_window(fft_size),
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            smoothed: vec![0.0; fft_size / 2],
            bytes: vec![0; fft_size / 2],
            generation: 0,
            computed: None,
        }
    }

    fn push(&mut self, left: &[f32], right: &[f32]) {
        for (l, r) in left.iter().zip(right) {
            self.ring[self.write_pos] = (l + r) * 0.5;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
        self.generation += 1;
    }

    fn refresh(&mut self) {
        if self.computed == Some(self.generation) {
            return;
        }

        // oldest sample first
        let ordered = self.ring[self.write_pos..]
            .iter()
            .chain(&self.ring[..self.write_pos]);
        for ((slot, s), w) in self.buffer.iter_mut().zip(ordered).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let magnitude_scale = 1.0 / self.fft_size as f32;
        let tau = self.smoothing;
        let range_scale = 1.0 / (self.max_db - self.min_db);

        for ((prev, byte), bin) in self
            .smoothed
            .iter_mut()
            .zip(self.bytes.iter_mut())
            .zip(&self.buffer)
        {
            let magnitude = bin.norm() * magnitude_scale;
            let mut value = tau * *prev + (1.0 - tau) * magnitude;
            if !value.is_finite() {
                value = 0.0;
            }
            *prev = value;

            let db = if value > 0.0 {
                20.0 * value.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 * (db - self.min_db) * range_scale;
            *byte = scaled.clamp(0.0, 255.0) as u8;
        }

        self.computed = Some(self.generation);
    }
}

/// Cloneable read handle onto an analyser node.
#[derive(Clone)]
pub struct AnalyserTap {
    core: Arc<Mutex<AnalyserCore>>,
}

impl AnalyserTap {
    fn lock(&self) -> MutexGuard<'_, AnalyserCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fft_size(&self) -> usize {
        self.lock().fft_size
    }

    #[cfg(test)]
    pub fn frequency_bin_count(&self) -> usize {
        self.lock().fft_size / 2
    }

    /// Current byte-scaled magnitude spectrum, one value per bin.
    pub fn byte_frequency_data(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.fill_byte_frequency_data(&mut out);
        out
    }

    /// Like [`byte_frequency_data`](Self::byte_frequency_data) but reuses `out`.
    pub fn fill_byte_frequency_data(&self, out: &mut Vec<u8>) {
        let mut core = self.lock();
        core.refresh();
        out.clear();
        out.extend_from_slice(&core.bytes);
    }
}

impl fmt::Debug for AnalyserTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserTap").finish()
    }
}

pub struct AnalyserNode {
    label: String,
    tap: AnalyserTap,
}

impl AnalyserNode {
    pub fn new(label: impl Into<String>, fft_size: usize, smoothing: f32) -> Self {
        debug_assert!(fft_size.is_power_of_two(), "fft size must be a power of two");
        Self {
            label: label.into(),
            tap: AnalyserTap {
                core: Arc::new(Mutex::new(AnalyserCore::new(fft_size, smoothing))),
            },
        }
    }

    pub fn tap(&self) -> AnalyserTap {
        self.tap.clone()
    }
}

impl AudioNode for AnalyserNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Analyser
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn process(&mut self, block: &mut StereoBlock, _ctx: &ProcessContext) {
        self.tap.lock().push(&block.left, &block.right);
    }

    fn taps(&self) -> NodeTaps {
        NodeTaps {
            analyser: Some(self.tap.clone()),
            reduction: None,
        }
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = i as f32 / n;
            0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44_100.0;

    fn feed_sine(node: &mut AnalyserNode, freq: f32, amplitude: f32, frames: usize) {
        let ctx = ProcessContext {
            sample_rate: SR,
        };
        let mut n = 0;
        while n < frames {
            let mut block = StereoBlock::new(128);
            for i in 0..128 {
                let s = amplitude * (2.0 * PI * freq * (n + i) as f32 / SR).sin();
                block.left[i] = s;
                block.right[i] = s;
            }
            node.process(&mut block, &ctx);
            n += 128;
        }
    }

    #[test]
    fn silence_reads_as_zero() {
        let mut node = AnalyserNode::new("analyser", 2048, 0.85);
        feed_sine(&mut node, 440.0, 0.0, 4096);
        let bins = node.tap().byte_frequency_data();
        assert_eq!(bins.len(), 1024);
        assert!(bins.iter().all(|b| *b == 0));
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let mut node = AnalyserNode::new("analyser", 4096, 0.0);
        feed_sine(&mut node, 1000.0, 0.5, 8192);
        let bins = node.tap().byte_frequency_data();
        let expected_bin = (1000.0 / (SR / 4096.0)).round() as usize;
        let (peak_bin, _) = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, b)| **b)
            .unwrap();
        assert!((peak_bin as i64 - expected_bin as i64).abs() <= 2);
        assert!(bins[expected_bin] > 200);
        assert!(bins[2000] < 10);
    }

    #[test]
    fn repeated_reads_share_one_snapshot() {
        let mut node = AnalyserNode::new("analyser", 1024, 0.85);
        feed_sine(&mut node, 2000.0, 0.5, 2048);
        let tap = node.tap();
        let first = tap.byte_frequency_data();
        let second = tap.byte_frequency_data();
        assert_eq!(first, second);
    }

    #[test]
    fn smoothing_lags_behind_input() {
        let mut smooth = AnalyserNode::new("a", 1024, 0.85);
        let mut raw = AnalyserNode::new("b", 1024, 0.0);
        feed_sine(&mut smooth, 3000.0, 0.5, 1024);
        feed_sine(&mut raw, 3000.0, 0.5, 1024);
        let bin = (3000.0 / (SR / 1024.0)).round() as usize;
        let smoothed = smooth.tap().byte_frequency_data()[bin];
        let direct = raw.tap().byte_frequency_data()[bin];
        assert!(smoothed < direct);
    }
}
