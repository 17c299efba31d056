//! Dynamics compressor.
//!
//! Stereo-linked peak detection, a soft-knee gain computer in the dB domain,
//! and a one-pole attack/release follower on the resulting gain reduction:
//!
//! ```text
//! over = level_db - threshold
//! 2|over| <= knee : out = level_db + (1/ratio - 1) * (over + knee/2)^2 / (2 * knee)
//! over > 0        : out = threshold + over / ratio
//! otherwise       : out = level_db
//! ```
//!
//! Parameters are sampled once per block. There is no makeup gain and no
//! look-ahead, so with `ratio == 1` the node is an exact passthrough.

use crate::graph::param::{AudioParam, Meter, ParamSmoother};
use crate::graph::{AudioNode, NodeKind, NodeTaps, ProcessContext, StereoBlock};

const SILENCE_DB: f32 = -180.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    pub threshold: f32,
    pub knee: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
}

impl CompressorSettings {
    /// Catches peaks just under full scale without audible pumping.
    pub const SAFETY_LIMITER: Self = Self {
        threshold: -0.5,
        knee: 10.0,
        ratio: 20.0,
        attack: 0.005,
        release: 0.1,
    };
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold: -24.0,
            knee: 30.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

struct Controls {
    threshold: ParamSmoother,
    knee: ParamSmoother,
    ratio: ParamSmoother,
    attack: ParamSmoother,
    release: ParamSmoother,
}

pub struct CompressorNode {
    label: String,
    threshold: AudioParam,
    knee: AudioParam,
    ratio: AudioParam,
    attack: AudioParam,
    release: AudioParam,
    controls: Controls,
    envelope_db: f32,
    reduction: Meter,
}

impl CompressorNode {
    pub fn new(label: impl Into<String>, settings: CompressorSettings) -> Self {
        let threshold = AudioParam::new("threshold", settings.threshold, -100.0, 0.0);
        let knee = AudioParam::new("knee", settings.knee, 0.0, 40.0);
        let ratio = AudioParam::new("ratio", settings.ratio, 1.0, 20.0);
        let attack = AudioParam::new("attack", settings.attack, 0.0, 1.0);
        let release = AudioParam::new("release", settings.release, 0.0, 1.0);
        let controls = Controls {
            threshold: threshold.smoother(),
            knee: knee.smoother(),
            ratio: ratio.smoother(),
            attack: attack.smoother(),
            release: release.smoother(),
        };

        Self {
            label: label.into(),
            threshold,
            knee,
            ratio,
            attack,
            release,
            controls,
            envelope_db: 0.0,
            reduction: Meter::default(),
        }
    }

    /// Current gain reduction in dB (zero or negative).
    #[cfg(test)]
    pub fn reduction(&self) -> f32 {
        self.reduction.read()
    }
}

/// Static curve: output level in dB for an input level in dB.
pub fn gain_computer(level_db: f32, threshold: f32, knee: f32, ratio: f32) -> f32 {
    let over = level_db - threshold;
    if knee > 0.0 && 2.0 * over.abs() <= knee {
        let x = over + knee * 0.5;
        level_db + (1.0 / ratio - 1.0) * x * x / (2.0 * knee)
    } else if over > 0.0 {
        threshold + over / ratio
    } else {
        level_db
    }
}

fn time_coefficient(seconds: f32, sample_rate: f32) -> f32 {
    if seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (seconds * sample_rate)).exp()
    }
}

impl AudioNode for CompressorNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Compressor
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn process(&mut self, block: &mut StereoBlock, ctx: &ProcessContext) {
        let frames = block.frames();
        let sr = ctx.sample_rate;
        let threshold = self.controls.threshold.advance(frames, sr);
        let knee = self.controls.knee.advance(frames, sr);
        let ratio = self.controls.ratio.advance(frames, sr).max(1.0);
        let attack = time_coefficient(self.controls.attack.advance(frames, sr), sr);
        let release = time_coefficient(self.controls.release.advance(frames, sr), sr);

        for (l, r) in block.left.iter_mut().zip(block.right.iter_mut()) {
            let level = l.abs().max(r.abs());
            let level_db = if level > 1e-9 {
                20.0 * level.log10()
            } else {
                SILENCE_DB
            };
            let target = gain_computer(level_db, threshold, knee, ratio) - level_db;
            let coeff = if target < self.envelope_db { attack } else { release };
            self.envelope_db = coeff * self.envelope_db + (1.0 - coeff) * target;

            let gain = 10f32.powf(self.envelope_db / 20.0);
            *l *= gain;
            *r *= gain;
        }

        self.reduction.write(self.envelope_db);
    }

    fn params(&self) -> Vec<(&'static str, AudioParam)> {
        vec![
            ("threshold", self.threshold.clone()),
            ("knee", self.knee.clone()),
            ("ratio", self.ratio.clone()),
            ("attack", self.attack.clone()),
            ("release", self.release.clone()),
        ]
    }

    fn taps(&self) -> NodeTaps {
        NodeTaps {
            analyser: None,
            reduction: Some(self.reduction.clone()),
        }
    }
}
