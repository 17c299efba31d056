use std::f32::consts::FRAC_PI_2;

use crate::graph::param::{AudioParam, ParamSmoother};
use crate::graph::{AudioNode, NodeKind, ProcessContext, StereoBlock, RENDER_QUANTUM};

/// Equal-power stereo panner for a stereo input.
///
/// Panning left folds part of the right channel into the left one and the
/// other way round, so a centred pan is an exact passthrough.
pub struct StereoPannerNode {
    label: String,
    pan: AudioParam,
    smoother: ParamSmoother,
    ramp: Vec<f32>,
}

impl StereoPannerNode {
    pub fn new(label: impl Into<String>) -> Self {
        let pan = AudioParam::new("pan", 0.0, -1.0, 1.0);
        let smoother = pan.smoother();
        Self {
            label: label.into(),
            pan,
            smoother,
            ramp: vec![0.0; RENDER_QUANTUM],
        }
    }

    pub fn pan(&self) -> &AudioParam {
        &self.pan
    }
}

/// Pans one stereo frame.
pub fn pan_frame(pan: f32, left: f32, right: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    if pan <= 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        (left + right * x.cos(), right * x.sin())
    } else {
        let x = pan * FRAC_PI_2;
        (left * x.cos(), right + left * x.sin())
    }
}

impl AudioNode for StereoPannerNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Panner
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn process(&mut self, block: &mut StereoBlock, ctx: &ProcessContext) {
        self.ramp.resize(block.frames(), 0.0);
        self.smoother.fill(&mut self.ramp, ctx.sample_rate);

        for ((l, r), pan) in block.left.iter_mut().zip(block.right.iter_mut()).zip(&self.ramp) {
            let (nl, nr) = pan_frame(*pan, *l, *r);
            *l = nl;
            *r = nr;
        }
    }

    fn params(&self) -> Vec<(&'static str, AudioParam)> {
        vec![("pan", self.pan.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_is_passthrough() {
        let (l, r) = pan_frame(0.0, 0.3, -0.7);
        assert!((l - 0.3).abs() < 1e-6);
        assert!((r + 0.7).abs() < 1e-6);
    }

    #[test]
    fn hard_left_moves_everything_left() {
        let (l, r) = pan_frame(-1.0, 0.5, 0.5);
        assert!((l - 1.0).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }

    #[test]
    fn hard_right_moves_everything_right() {
        let (l, r) = pan_frame(1.0, 0.5, 0.25);
        assert!(l.abs() < 1e-6);
        assert!((r - 0.75).abs() < 1e-6);
    }
}
