//! Uniformly-partitioned FFT convolution.
//!
//! Each channel is convolved with its own impulse-response channel using
//! overlap-save over 512-frame partitions and a frequency-domain delay line.
//! Input is buffered one partition at a time, so the node adds exactly
//! `PARTITION` frames of latency.

use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::chain::impulse::ImpulseResponse;
use crate::graph::{AudioNode, NodeKind, ProcessContext, StereoBlock};

pub const PARTITION: usize = 512;

const GAIN_CALIBRATION_DB: f32 = -58.0;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44_100.0;
const MIN_POWER: f32 = 0.000125;

/// Loudness normalisation applied to an impulse response before use.
pub fn normalization_scale(ir: &ImpulseResponse) -> f32 {
    let frames = ir.len();
    if frames == 0 {
        return 1.0;
    }

    let energy: f32 = (0..2)
        .flat_map(|c| ir.channel(c).iter())
        .map(|s| s * s)
        .sum();
    let mut power = (energy / (2 * frames) as f32).sqrt();
    if !power.is_finite() || power < MIN_POWER {
        power = MIN_POWER;
    }

    let mut scale = 1.0 / power;
    scale *= 10f32.powf(GAIN_CALIBRATION_DB * 0.05);
    if ir.sample_rate() > 0 {
        scale *= GAIN_CALIBRATION_SAMPLE_RATE / ir.sample_rate() as f32;
    }
    scale
}

struct ChannelConvolver {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    ir_spectra: Vec<Vec<Complex<f32>>>,
    history: Vec<Vec<Complex<f32>>>,
    cursor: usize,
    previous: Vec<f32>,
    pending: Vec<f32>,
    output: VecDeque<f32>,
    work: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl ChannelConvolver {
    fn new(planner: &mut FftPlanner<f32>, response: &[f32], scale: f32) -> Self {
        let size = PARTITION * 2;
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());
        let mut scratch = vec![Complex::new(0.0, 0.0); scratch_len];

        let partitions = response.len().div_ceil(PARTITION).max(1);
        let ir_spectra: Vec<Vec<Complex<f32>>> = (0..partitions)
            .map(|p| {
                let mut spectrum = vec![Complex::new(0.0, 0.0); size];
                let start = (p * PARTITION).min(response.len());
                let end = ((p + 1) * PARTITION).min(response.len());
                for (slot, &s) in spectrum.iter_mut().zip(&response[start..end]) {
                    *slot = Complex::new(s * scale, 0.0);
                }
                fft.process_with_scratch(&mut spectrum, &mut scratch);
                spectrum
            })
            .collect();

        let mut output = VecDeque::with_capacity(PARTITION * 2);
        output.extend(std::iter::repeat(0.0).take(PARTITION));

        Self {
            fft,
            ifft,
            history: vec![vec![Complex::new(0.0, 0.0); size]; partitions],
            ir_spectra,
            cursor: 0,
            previous: vec![0.0; PARTITION],
            pending: Vec::with_capacity(PARTITION),
            output,
            work: vec![Complex::new(0.0, 0.0); size],
            accum: vec![Complex::new(0.0, 0.0); size],
            scratch,
        }
    }

    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            self.pending.push(*sample);
            if self.pending.len() == PARTITION {
                self.run_partition();
            }
            *sample = self.output.pop_front().unwrap_or(0.0);
        }
    }

    fn run_partition(&mut self) {
        let partitions = self.ir_spectra.len();

        for (slot, &s) in self
            .work
            .iter_mut()
            .zip(self.previous.iter().chain(self.pending.iter()))
        {
            *slot = Complex::new(s, 0.0);
        }
        self.fft.process_with_scratch(&mut self.work, &mut self.scratch);
        self.history[self.cursor].copy_from_slice(&self.work);

        self.accum.fill(Complex::new(0.0, 0.0));
        for p in 0..partitions {
            let idx = (self.cursor + partitions - p) % partitions;
            for ((acc, x), h) in self
                .accum
                .iter_mut()
                .zip(&self.history[idx])
                .zip(&self.ir_spectra[p])
            {
                *acc += x * h;
            }
        }
        self.cursor = (self.cursor + 1) % partitions;

        self.ifft.process_with_scratch(&mut self.accum, &mut self.scratch);
        let norm = 1.0 / self.accum.len() as f32;
        self.output
            .extend(self.accum[PARTITION..].iter().map(|c| c.re * norm));

        std::mem::swap(&mut self.previous, &mut self.pending);
        self.pending.clear();
    }
}

/// Stereo convolver: left with IR channel 0, right with IR channel 1.
pub struct ConvolverNode {
    label: String,
    left: ChannelConvolver,
    right: ChannelConvolver,
}

impl ConvolverNode {
    pub fn new(label: impl Into<String>, response: &ImpulseResponse, normalize: bool) -> Self {
        let scale = if normalize {
            normalization_scale(response)
        } else {
            1.0
        };
        let mut planner = FftPlanner::<f32>::new();
        let left = ChannelConvolver::new(&mut planner, response.channel(0), scale);
        let right = ChannelConvolver::new(&mut planner, response.channel(1), scale);

        Self {
            label: label.into(),
            left,
            right,
        }
    }
}

impl AudioNode for ConvolverNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Convolver
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn process(&mut self, block: &mut StereoBlock, _ctx: &ProcessContext) {
        let (left, right) = (&mut self.left, &mut self.right);
        let (left_samples, right_samples) = (&mut block.left, &mut block.right);
        rayon::join(
            || left.process(left_samples),
            || right.process(right_samples),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ProcessContext {
        ProcessContext {
            sample_rate: 44_100.0,
        }
    }

    fn run(node: &mut ConvolverNode, input: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(input.len());
        for chunk in input.chunks(128) {
            let mut block = StereoBlock::new(chunk.len());
            block.left.copy_from_slice(chunk);
            block.right.copy_from_slice(chunk);
            node.process(&mut block, &ctx());
            out.extend_from_slice(&block.left);
        }
        out
    }

    #[test]
    fn matches_direct_convolution_after_latency() {
        let response: Vec<f32> = (0..1500).map(|i| ((i * 7 % 13) as f32 - 6.0) / 10.0).collect();
        let ir = ImpulseResponse::from_channels(44_100, response.clone(), response.clone());
        let mut node = ConvolverNode::new("reflection", &ir, false);

        let input: Vec<f32> = (0..4096).map(|i| ((i * 31 % 17) as f32 - 8.0) / 8.0).collect();
        let output = run(&mut node, &input);

        for n in (0..input.len() - PARTITION).step_by(37) {
            let expected: f32 = (0..=n.min(response.len() - 1))
                .map(|k| response[k] * input[n - k])
                .sum();
            let got = output[n + PARTITION];
            assert!((got - expected).abs() < 1e-2, "n={n} got={got} expected={expected}");
        }
    }

    #[test]
    fn unit_impulse_delays_by_one_partition() {
        let ir = ImpulseResponse::from_channels(44_100, vec![1.0], vec![1.0]);
        let mut node = ConvolverNode::new("reflection", &ir, false);
        let mut input = vec![0.0; 2048];
        input[10] = 1.0;
        let output = run(&mut node, &input);
        assert!((output[10 + PARTITION] - 1.0).abs() < 1e-5);
        assert!(output[..PARTITION].iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn normalisation_follows_power_and_rate() {
        let ir = ImpulseResponse::from_channels(44_100, vec![0.5; 100], vec![0.5; 100]);
        let expected = 2.0 * 10f32.powf(-58.0 / 20.0);
        assert!((normalization_scale(&ir) - expected).abs() < 1e-6);

        let silent = ImpulseResponse::from_channels(88_200, vec![0.0; 100], vec![0.0; 100]);
        let expected = (1.0 / MIN_POWER) * 10f32.powf(-58.0 / 20.0) * 0.5;
        assert!((normalization_scale(&silent) - expected).abs() / expected < 1e-5);
    }
}
