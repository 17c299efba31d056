use crate::graph::{AudioNode, NodeKind, ProcessContext, StereoBlock};

/// Fans one input out to a dry and a wet series and sums them back together.
pub struct SplitNode {
    label: String,
    dry: Vec<Box<dyn AudioNode>>,
    wet: Vec<Box<dyn AudioNode>>,
    wet_block: StereoBlock,
}

impl SplitNode {
    pub fn new(
        label: impl Into<String>,
        dry: Vec<Box<dyn AudioNode>>,
        wet: Vec<Box<dyn AudioNode>>,
    ) -> Self {
        Self {
            label: label.into(),
            dry,
            wet,
            wet_block: StereoBlock::default(),
        }
    }
}

impl AudioNode for SplitNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Split
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn process(&mut self, block: &mut StereoBlock, ctx: &ProcessContext) {
        self.wet_block.copy_from(block);
        for node in &mut self.dry {
            node.process(block, ctx);
        }
        for node in &mut self.wet {
            node.process(&mut self.wet_block, ctx);
        }
        block.mix_from(&self.wet_block);
    }
}
