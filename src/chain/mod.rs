//! The playback signal chain and its control surface.

pub mod analysis;
pub mod command;
pub mod engine;
pub mod impulse;
pub mod surface;
pub mod topology;

pub use analysis::AudioAnalysis;
pub use command::{Automation, ParameterCommand};
pub use engine::{AudioEngine, BuildStatus, EngineSettings};
