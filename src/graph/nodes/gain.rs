use crate::graph::param::{AudioParam, ParamSmoother};
use crate::graph::{AudioNode, NodeKind, ProcessContext, StereoBlock, RENDER_QUANTUM};

/// Upper bound of a gain parameter, about +24 dB.
pub const MAX_LINEAR_GAIN: f32 = 16.0;

/// Linear gain with a per-sample smoothed parameter.
pub struct GainNode {
    label: String,
    gain: AudioParam,
    smoother: ParamSmoother,
    ramp: Vec<f32>,
}

impl GainNode {
    pub fn new(label: impl Into<String>, initial: f32) -> Self {
        let gain = AudioParam::new("gain", initial, 0.0, MAX_LINEAR_GAIN);
        let smoother = gain.smoother();
        Self {
            label: label.into(),
            gain,
            smoother,
            ramp: vec![0.0; RENDER_QUANTUM],
        }
    }

    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }
}

impl AudioNode for GainNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Gain
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn process(&mut self, block: &mut StereoBlock, ctx: &ProcessContext) {
        let frames = block.frames();
        self.ramp.resize(frames, 0.0);
        self.smoother.fill(&mut self.ramp, ctx.sample_rate);

        for ((l, r), g) in block.left.iter_mut().zip(block.right.iter_mut()).zip(&self.ramp) {
            *l *= g;
            *r *= g;
        }
    }

    fn params(&self) -> Vec<(&'static str, AudioParam)> {
        vec![("gain", self.gain.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ProcessContext {
        ProcessContext {
            sample_rate: 48_000.0,
        }
    }

    #[test]
    fn applies_initial_gain() {
        let mut node = GainNode::new("dry", 0.5);
        let mut block = StereoBlock::new(RENDER_QUANTUM);
        block.left.fill(1.0);
        block.right.fill(-1.0);
        node.process(&mut block, &ctx());
        assert!(block.left.iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert!(block.right.iter().all(|s| (*s + 0.5).abs() < 1e-6));
    }

    #[test]
    fn ramps_toward_new_gain_without_jumping() {
        let mut node = GainNode::new("volume", 1.0);
        node.gain().set_target_at_time(0.0, 0.01);
        let mut block = StereoBlock::new(RENDER_QUANTUM);
        block.left.fill(1.0);
        node.process(&mut block, &ctx());
        assert!(block.left[0] > 0.99);
        assert!(block.left[RENDER_QUANTUM - 1] < block.left[0]);
        assert!(block.left[RENDER_QUANTUM - 1] > 0.0);
    }
}
