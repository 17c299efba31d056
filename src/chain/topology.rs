//! Declarative chain description and the generic builder that wires it.
//!
//! The stage order is data: [`default_topology`] lists it, and
//! [`wire_in_sequence`] turns any list of stages into nodes through a
//! [`NodeFactory`], so the order can be checked without building real DSP.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;

use crate::chain::impulse::{ImpulseResponse, REFLECTION_SECONDS};
use crate::graph::nodes::analyser::{AnalyserNode, AnalyserTap};
use crate::graph::nodes::compressor::{CompressorNode, CompressorSettings};
use crate::graph::nodes::convolver::ConvolverNode;
use crate::graph::nodes::gain::GainNode;
use crate::graph::nodes::panner::StereoPannerNode;
use crate::graph::nodes::peaking::PeakingFilterNode;
use crate::graph::nodes::split::SplitNode;
use crate::graph::param::{AudioParam, Meter};
use crate::graph::{AudioNode, NodeKind};

/// Graphic-equaliser centre frequencies, ascending.
pub const EQ_FREQUENCIES: [f32; 10] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];
pub const EQ_Q: f32 = 1.4;
pub const BAND_COUNT: usize = EQ_FREQUENCIES.len();

pub const PRESENCE_FREQUENCY: f32 = 1500.0;
pub const PRESENCE_Q: f32 = 0.5;

pub const ANALYSER_FFT_SIZE: usize = 4096;
pub const ANALYSER_SMOOTHING: f32 = 0.85;

/// What a node is for within the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeRole {
    PreAmp,
    Band(usize),
    Presence,
    Panner,
    Dry,
    Reflection,
    Wet,
    Analyser,
    Output,
    Limiter,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::PreAmp => write!(f, "preamp"),
            NodeRole::Band(i) => write!(f, "eq-{}", EQ_FREQUENCIES.get(*i).copied().unwrap_or(0.0)),
            NodeRole::Presence => write!(f, "presence"),
            NodeRole::Panner => write!(f, "panner"),
            NodeRole::Dry => write!(f, "dry"),
            NodeRole::Reflection => write!(f, "reflection"),
            NodeRole::Wet => write!(f, "wet"),
            NodeRole::Analyser => write!(f, "analyser"),
            NodeRole::Output => write!(f, "output"),
            NodeRole::Limiter => write!(f, "limiter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpec {
    Gain { role: NodeRole, initial: f32 },
    Peaking { role: NodeRole, frequency: f32, q: f32 },
    Panner { role: NodeRole },
    Convolver { role: NodeRole, seconds: f32 },
    Analyser { role: NodeRole, fft_size: usize, smoothing: f32 },
    Compressor { role: NodeRole, settings: CompressorSettings },
}

impl NodeSpec {
    pub fn role(&self) -> NodeRole {
        match self {
            NodeSpec::Gain { role, .. }
            | NodeSpec::Peaking { role, .. }
            | NodeSpec::Panner { role }
            | NodeSpec::Convolver { role, .. }
            | NodeSpec::Analyser { role, .. }
            | NodeSpec::Compressor { role, .. } => *role,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeSpec::Gain { .. } => NodeKind::Gain,
            NodeSpec::Peaking { .. } => NodeKind::Filter,
            NodeSpec::Panner { .. } => NodeKind::Panner,
            NodeSpec::Convolver { .. } => NodeKind::Convolver,
            NodeSpec::Analyser { .. } => NodeKind::Analyser,
            NodeSpec::Compressor { .. } => NodeKind::Compressor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Node(NodeSpec),
    /// Parallel dry and wet series fed the same input, summed on the way out.
    Split {
        dry: Vec<NodeSpec>,
        wet: Vec<NodeSpec>,
    },
}

/// source → preamp → 10 × peaking → presence → panner → (dry | convolver → wet)
/// → analyser → output → limiter → sink
pub fn default_topology(initial_volume: f32) -> Vec<Stage> {
    let mut stages = vec![Stage::Node(NodeSpec::Gain {
        role: NodeRole::PreAmp,
        initial: 1.0,
    })];

    stages.extend(EQ_FREQUENCIES.iter().enumerate().map(|(i, &frequency)| {
        Stage::Node(NodeSpec::Peaking {
            role: NodeRole::Band(i),
            frequency,
            q: EQ_Q,
        })
    }));

    stages.extend([
        Stage::Node(NodeSpec::Peaking {
            role: NodeRole::Presence,
            frequency: PRESENCE_FREQUENCY,
            q: PRESENCE_Q,
        }),
        Stage::Node(NodeSpec::Panner {
            role: NodeRole::Panner,
        }),
        Stage::Split {
            dry: vec![NodeSpec::Gain {
                role: NodeRole::Dry,
                initial: 1.0,
            }],
            wet: vec![
                NodeSpec::Convolver {
                    role: NodeRole::Reflection,
                    seconds: REFLECTION_SECONDS,
                },
                NodeSpec::Gain {
                    role: NodeRole::Wet,
                    initial: 0.0,
                },
            ],
        },
        Stage::Node(NodeSpec::Analyser {
            role: NodeRole::Analyser,
            fft_size: ANALYSER_FFT_SIZE,
            smoothing: ANALYSER_SMOOTHING,
        }),
        Stage::Node(NodeSpec::Gain {
            role: NodeRole::Output,
            initial: initial_volume,
        }),
        Stage::Node(NodeSpec::Compressor {
            role: NodeRole::Limiter,
            settings: CompressorSettings::SAFETY_LIMITER,
        }),
    ]);

    stages
}

pub trait NodeFactory {
    fn create(&mut self, spec: &NodeSpec) -> Box<dyn AudioNode>;
}

/// Builds the real DSP nodes for a given sample rate.
pub struct DspNodeFactory<'a, R: Rng + ?Sized> {
    sample_rate: u32,
    rng: &'a mut R,
}

impl<'a, R: Rng + ?Sized> DspNodeFactory<'a, R> {
    pub fn new(sample_rate: u32, rng: &'a mut R) -> Self {
        Self { sample_rate, rng }
    }
}

impl<R: Rng + ?Sized> NodeFactory for DspNodeFactory<'_, R> {
    fn create(&mut self, spec: &NodeSpec) -> Box<dyn AudioNode> {
        let label = spec.role().to_string();
        let sample_rate = self.sample_rate as f32;
        match *spec {
            NodeSpec::Gain { initial, .. } => Box::new(GainNode::new(label, initial)),
            NodeSpec::Peaking { frequency, q, .. } => {
                Box::new(PeakingFilterNode::new(label, sample_rate, frequency, q))
            }
            NodeSpec::Panner { .. } => Box::new(StereoPannerNode::new(label)),
            NodeSpec::Convolver { seconds, .. } => {
                let response = ImpulseResponse::generate(seconds, self.sample_rate, &mut *self.rng);
                Box::new(ConvolverNode::new(label, &response, true))
            }
            NodeSpec::Analyser {
                fft_size,
                smoothing,
                ..
            } => Box::new(AnalyserNode::new(label, fft_size, smoothing)),
            NodeSpec::Compressor { settings, .. } => Box::new(CompressorNode::new(label, settings)),
        }
    }
}

/// Node role plus the parameter's local name.
pub type ParamKey = (NodeRole, &'static str);

/// Every automatable parameter of a chain.
#[derive(Debug, Clone, Default)]
pub struct ParamBank {
    params: BTreeMap<ParamKey, AudioParam>,
}

impl ParamBank {
    pub fn insert(&mut self, role: NodeRole, name: &'static str, param: AudioParam) {
        if self.params.insert((role, name), param).is_some() {
            log::warn!("Duplicate parameter {}.{} replaced", role, name);
        }
    }

    pub fn get(&self, role: NodeRole, name: &str) -> Option<&AudioParam> {
        self.params
            .iter()
            .find(|((r, n), _)| *r == role && *n == name)
            .map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParamKey> {
        self.params.keys()
    }
}

/// Output of [`wire_in_sequence`].
pub struct WiredChain {
    pub stages: Vec<Box<dyn AudioNode>>,
    pub params: ParamBank,
    pub analyser: Option<AnalyserTap>,
    pub reduction: Option<Meter>,
    /// Roles in creation order, split branches dry first.
    pub order: Vec<NodeRole>,
}

impl WiredChain {
    pub fn node_count(&self) -> usize {
        self.order.len()
    }
}

/// Creates every stage in order and connects them in series.
pub fn wire_in_sequence(topology: &[Stage], factory: &mut dyn NodeFactory) -> WiredChain {
    let mut wired = WiredChain {
        stages: Vec::with_capacity(topology.len()),
        params: ParamBank::default(),
        analyser: None,
        reduction: None,
        order: Vec::new(),
    };

    for stage in topology {
        let node = match stage {
            Stage::Node(spec) => create_node(spec, factory, &mut wired),
            Stage::Split { dry, wet } => {
                let dry = dry
                    .iter()
                    .map(|spec| create_node(spec, factory, &mut wired))
                    .collect();
                let wet = wet
                    .iter()
                    .map(|spec| create_node(spec, factory, &mut wired))
                    .collect();
                Box::new(SplitNode::new("split", dry, wet)) as Box<dyn AudioNode>
            }
        };
        wired.stages.push(node);
    }

    log::debug!(
        "Wired {} stages ({} nodes, {} parameters)",
        wired.stages.len(),
        wired.order.len(),
        wired.params.len()
    );
    wired
}

fn create_node(
    spec: &NodeSpec,
    factory: &mut dyn NodeFactory,
    wired: &mut WiredChain,
) -> Box<dyn AudioNode> {
    let node = factory.create(spec);
    let role = spec.role();

    for (name, param) in node.params() {
        wired.params.insert(role, name, param);
    }

    let taps = node.taps();
    if let Some(tap) = taps.analyser {
        wired.analyser = Some(tap);
    }
    if let Some(meter) = taps.reduction {
        wired.reduction = Some(meter);
    }

    wired.order.push(role);
    node
}
