//! Peaking (bell) equaliser stage.
//!
//! RBJ cookbook peaking biquad from the `biquad` crate, one filter state per
//! channel. Centre frequency and Q are fixed for the node's lifetime; only
//! the gain moves. The smoothed gain is sampled once per sub-block and the
//! coefficients are rebuilt only when it has actually changed.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

use crate::graph::param::{AudioParam, ParamSmoother};
use crate::graph::{AudioNode, NodeKind, ProcessContext, StereoBlock};

const COEFF_INTERVAL: usize = 32;
const GAIN_EPSILON: f32 = 1e-4;

pub const MIN_FILTER_GAIN_DB: f32 = -40.0;
pub const MAX_FILTER_GAIN_DB: f32 = 40.0;

pub struct PeakingFilterNode {
    label: String,
    frequency: f32,
    q: f32,
    sample_rate: f32,
    gain: AudioParam,
    smoother: ParamSmoother,
    applied_gain: f32,
    left: DirectForm2Transposed<f32>,
    right: DirectForm2Transposed<f32>,
}

impl PeakingFilterNode {
    pub fn new(label: impl Into<String>, sample_rate: f32, frequency: f32, q: f32) -> Self {
        let label = label.into();
        let nyquist = sample_rate * 0.5;
        let frequency = if frequency >= nyquist {
            let clamped = nyquist * 0.999;
            log::debug!(
                "{}: centre {:.0} Hz is above Nyquist, using {:.0} Hz",
                label,
                frequency,
                clamped
            );
            clamped
        } else {
            frequency
        };

        let gain = AudioParam::new("gain", 0.0, MIN_FILTER_GAIN_DB, MAX_FILTER_GAIN_DB);
        let smoother = gain.smoother();
        let coeffs = peaking_coefficients(sample_rate, frequency, q, 0.0);

        Self {
            label,
            frequency,
            q,
            sample_rate,
            gain,
            smoother,
            applied_gain: 0.0,
            left: DirectForm2Transposed::<f32>::new(coeffs),
            right: DirectForm2Transposed::<f32>::new(coeffs),
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }

    fn retune(&mut self, gain_db: f32) {
        let coeffs = peaking_coefficients(self.sample_rate, self.frequency, self.q, gain_db);
        self.left.update_coefficients(coeffs);
        self.right.update_coefficients(coeffs);
        self.applied_gain = gain_db;
    }
}

impl AudioNode for PeakingFilterNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Filter
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn process(&mut self, block: &mut StereoBlock, ctx: &ProcessContext) {
        let frames = block.frames();
        let mut start = 0;

        while start < frames {
            let end = (start + COEFF_INTERVAL).min(frames);
            let gain_db = self.smoother.current();
            if (gain_db - self.applied_gain).abs() > GAIN_EPSILON {
                self.retune(gain_db);
            }

            for sample in &mut block.left[start..end] {
                *sample = self.left.run(*sample);
            }
            for sample in &mut block.right[start..end] {
                *sample = self.right.run(*sample);
            }

            self.smoother.advance(end - start, ctx.sample_rate);
            start = end;
        }
    }

    fn params(&self) -> Vec<(&'static str, AudioParam)> {
        vec![("gain", self.gain.clone())]
    }
}

fn peaking_coefficients(sample_rate: f32, frequency: f32, q: f32, gain_db: f32) -> Coefficients<f32> {
    Coefficients::<f32>::from_params(Type::PeakingEQ(gain_db), sample_rate.hz(), frequency.hz(), q)
        .unwrap_or(Coefficients {
            a1: 0.0,
            a2: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
        })
}
