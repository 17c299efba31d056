//! Owned audio engine: context clock, the built chain and its lifecycle.

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::audio::media::MediaElement;
use crate::audio::sink::{Sink, SinkError};
use crate::chain::topology::{default_topology, wire_in_sequence, DspNodeFactory, ParamBank, WiredChain};
#[cfg(test)]
use crate::chain::topology::{NodeFactory, Stage};
use crate::graph::nodes::analyser::AnalyserTap;
use crate::graph::param::Meter;
use crate::graph::{AudioNode, ProcessContext, StereoBlock, RENDER_QUANTUM};
use crate::visual::renderer::CancelToken;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio context is closed")]
    ContextClosed,
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// Sample rate, run state and frame clock.
#[derive(Debug)]
pub struct AudioContext {
    sample_rate: u32,
    state: ContextState,
    frames_rendered: u64,
}

impl AudioContext {
    /// Contexts start suspended until explicitly resumed.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            state: ContextState::Suspended,
            frames_rendered: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Seconds of audio processed while running.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Linear output gain the chain starts at.
    pub initial_volume: f32,
    /// Seeds impulse-response noise; `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            initial_volume: 1.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Built,
    AlreadyBuilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOutcome {
    pub frames: usize,
    pub source_ended: bool,
}

pub(crate) struct Chain {
    pub(crate) source: MediaElement,
    pub(crate) stages: Vec<Box<dyn AudioNode>>,
    pub(crate) params: ParamBank,
    pub(crate) analyser: Option<AnalyserTap>,
    pub(crate) reduction: Option<Meter>,
    node_count: usize,
}

pub struct AudioEngine {
    context: AudioContext,
    settings: EngineSettings,
    rng: StdRng,
    pub(crate) chain: Option<Chain>,
    block: StereoBlock,
    render_token: CancelToken,
}

impl AudioEngine {
    pub fn new(sample_rate: u32, settings: EngineSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            context: AudioContext::new(sample_rate),
            settings,
            rng,
            chain: None,
            block: StereoBlock::new(RENDER_QUANTUM),
            render_token: CancelToken::new(),
        }
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn sample_rate(&self) -> u32 {
        self.context.sample_rate
    }

    /// Wires the default chain for `source`. Once a chain exists further
    /// calls change nothing.
    pub fn build(&mut self, source: &MediaElement) -> BuildStatus {
        if self.is_built_for(source) {
            return BuildStatus::AlreadyBuilt;
        }

        let topology = default_topology(self.settings.initial_volume);
        let wired = {
            let mut factory = DspNodeFactory::new(self.context.sample_rate, &mut self.rng);
            wire_in_sequence(&topology, &mut factory)
        };
        self.install(source, wired)
    }

    /// Like [`build`](Self::build) with a caller-chosen topology and node factory.
    #[cfg(test)]
    pub fn build_with(
        &mut self,
        source: &MediaElement,
        topology: &[Stage],
        factory: &mut dyn NodeFactory,
    ) -> BuildStatus {
        if self.is_built_for(source) {
            return BuildStatus::AlreadyBuilt;
        }
        let wired = wire_in_sequence(topology, factory);
        self.install(source, wired)
    }

    fn is_built_for(&self, source: &MediaElement) -> bool {
        match &self.chain {
            Some(chain) => {
                if chain.source.id() != source.id() {
                    log::warn!(
                        "Chain already built for media {}, ignoring media {}",
                        chain.source.id(),
                        source.id()
                    );
                }
                true
            }
            None => false,
        }
    }

    fn install(&mut self, source: &MediaElement, wired: WiredChain) -> BuildStatus {
        let node_count = wired.node_count();
        if self.render_token.is_cancelled() {
            self.render_token = CancelToken::new();
        }

        log::info!(
            "Built chain: {} nodes @ {}Hz for media {}",
            node_count,
            self.context.sample_rate,
            source.id()
        );

        self.chain = Some(Chain {
            source: source.clone(),
            stages: wired.stages,
            params: wired.params,
            analyser: wired.analyser,
            reduction: wired.reduction,
            node_count,
        });
        BuildStatus::Built
    }

    #[cfg(test)]
    pub fn is_built(&self) -> bool {
        self.chain.is_some()
    }

    pub fn node_count(&self) -> usize {
        self.chain.as_ref().map_or(0, |c| c.node_count)
    }

    pub fn source(&self) -> Option<&MediaElement> {
        self.chain.as_ref().map(|c| &c.source)
    }

    /// Starts the clock if suspended. Safe to call repeatedly.
    pub fn resume_context(&mut self) {
        if self.context.state == ContextState::Suspended {
            self.context.state = ContextState::Running;
            log::debug!("Audio context resumed");
        }
    }

    /// Whether audible output is being produced from a live source.
    pub fn is_playing(&self) -> bool {
        self.context.state == ContextState::Running
            && self
                .chain
                .as_ref()
                .is_some_and(|c| !c.source.ended())
    }

    /// Token cancelled on teardown; hand it to the render loop.
    pub fn render_token(&self) -> CancelToken {
        self.render_token.clone()
    }

    /// Pulls `frames` frames through the chain into `sink`, one quantum at a
    /// time. Suspended contexts and unbuilt engines produce silence.
    pub fn render(&mut self, frames: usize, sink: &mut dyn Sink) -> Result<RenderOutcome, EngineError> {
        if self.context.state == ContextState::Closed {
            return Err(EngineError::ContextClosed);
        }

        let sample_rate = self.context.sample_rate;
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(RENDER_QUANTUM);
            self.block.resize(n);

            match (&mut self.chain, self.context.state) {
                (Some(chain), ContextState::Running) => {
                    chain
                        .source
                        .read_into(&mut self.block.left, &mut self.block.right, sample_rate);
                    let ctx = ProcessContext {
                        sample_rate: sample_rate as f32,
                    };
                    for stage in chain.stages.iter_mut() {
                        stage.process(&mut self.block, &ctx);
                    }
                    self.context.frames_rendered += n as u64;
                }
                _ => self.block.silence(),
            }

            sink.write(&self.block.left, &self.block.right)?;
            remaining -= n;
        }

        Ok(RenderOutcome {
            frames,
            source_ended: self.chain.as_ref().map_or(true, |c| c.source.ended()),
        })
    }

    /// Drops every node, last stage first, releases the source and cancels
    /// the render loop. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.render_token.cancel();
        let Some(mut chain) = self.chain.take() else {
            return;
        };

        while let Some(stage) = chain.stages.pop() {
            log::trace!("Disconnected {} ({:?})", stage.label(), stage.kind());
        }
        log::info!("Chain torn down ({} nodes)", chain.node_count);
    }

    /// Tears down and closes the context for good.
    pub fn close(&mut self) {
        self.teardown();
        self.context.state = ContextState::Closed;
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}
