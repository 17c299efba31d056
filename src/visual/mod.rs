//! Beat-reactive visualizer drawn on a software canvas.

pub mod beat;
pub mod canvas;
pub mod particles;
pub mod renderer;
pub mod spectrum;
