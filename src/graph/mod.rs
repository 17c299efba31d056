pub mod nodes;
pub mod param;

use nodes::analyser::AnalyserTap;
use param::{AudioParam, Meter};

/// Frames pulled through the graph per processing call.
pub const RENDER_QUANTUM: usize = 128;

/// Planar stereo buffer processed in place by every node.
#[derive(Debug, Clone, Default)]
pub struct StereoBlock {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBlock {
    pub fn new(frames: usize) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn resize(&mut self, frames: usize) {
        self.left.resize(frames, 0.0);
        self.right.resize(frames, 0.0);
    }

    pub fn silence(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    pub fn copy_from(&mut self, other: &StereoBlock) {
        self.left.clear();
        self.left.extend_from_slice(&other.left);
        self.right.clear();
        self.right.extend_from_slice(&other.right);
    }

    /// Sums `other` into this block sample by sample.
    pub fn mix_from(&mut self, other: &StereoBlock) {
        for (dst, src) in self.left.iter_mut().zip(&other.left) {
            *dst += src;
        }
        for (dst, src) in self.right.iter_mut().zip(&other.right) {
            *dst += src;
        }
    }

    #[cfg(test)]
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(&self.right)
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessContext {
    pub sample_rate: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Gain,
    Filter,
    Panner,
    Convolver,
    Analyser,
    Compressor,
    Split,
}

/// Read-side attachments a node exposes besides its parameters.
#[derive(Debug, Clone, Default)]
pub struct NodeTaps {
    pub analyser: Option<AnalyserTap>,
    pub reduction: Option<Meter>,
}

pub trait AudioNode: Send {
    fn kind(&self) -> NodeKind;

    fn label(&self) -> &str;

    /// Processes one block in place.
    fn process(&mut self, block: &mut StereoBlock, ctx: &ProcessContext);

    /// Automatable parameters, by local name.
    fn params(&self) -> Vec<(&'static str, AudioParam)> {
        Vec::new()
    }

    fn taps(&self) -> NodeTaps {
        NodeTaps::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixes_blocks() {
        let mut a = StereoBlock::new(4);
        a.left.fill(0.25);
        let mut b = StereoBlock::new(4);
        b.left.fill(0.5);
        b.right.fill(-1.0);
        a.mix_from(&b);
        assert_eq!(a.left, vec![0.75; 4]);
        assert_eq!(a.right, vec![-1.0; 4]);
        assert_eq!(a.peak(), 1.0);
    }
}
