//! Per-frame visualizer state machine and its cancellable driving loop.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::visual::beat::{BeatDetector, BeatReading};
use crate::visual::canvas::{Canvas, CanvasError};
use crate::visual::particles::ParticleField;
use crate::visual::spectrum::{Spectrum, DEFAULT_BAR_COUNT};

/// Trail fade laid over the previous frame.
const BACKGROUND_FADE: [u8; 4] = [6, 4, 14, 64];
const HUE_DRIFT_PER_FRAME: f32 = 0.2;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct VisualSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bar_count: usize,
    pub max_particles: usize,
    /// Chance per loud bar per frame of shedding tip particles.
    pub tip_chance: f32,
    pub seed: Option<u64>,
}

impl Default for VisualSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 60,
            bar_count: DEFAULT_BAR_COUNT,
            max_particles: 600,
            tip_chance: 0.08,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub bins: &'a [u8],
    pub now_ms: f64,
    pub playing: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub frames: u64,
    pub beats: u64,
    pub over_budget: u64,
    pub slowest: Duration,
}

pub struct Visualizer {
    canvas: Canvas,
    detector: BeatDetector,
    field: ParticleField,
    spectrum: Spectrum,
    rng: StdRng,
    tip_chance: f32,
    frame_budget: Duration,
    skip_tips: bool,
    hue: f32,
    stats: FrameStats,
}

impl Visualizer {
    pub fn new(settings: &VisualSettings) -> Result<Self, CanvasError> {
        let canvas = Canvas::new(settings.width, settings.height)?;
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            canvas,
            detector: BeatDetector::new(),
            field: ParticleField::new(settings.width, settings.height, settings.max_particles),
            spectrum: Spectrum::new(settings.bar_count),
            rng,
            tip_chance: settings.tip_chance,
            frame_budget: Duration::from_secs_f64(1.0 / settings.fps.max(1) as f64),
            skip_tips: false,
            hue: 0.0,
            stats: FrameStats::default(),
        })
    }

    #[cfg(test)]
    pub fn with_frame_budget(mut self, budget: Duration) -> Self {
        self.frame_budget = budget;
        self
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn field(&self) -> &ParticleField {
        &self.field
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// No particle or shockwave left to animate.
    pub fn is_idle(&self) -> bool {
        self.field.is_empty()
    }

    /// Runs one display frame and reports the smoothed energy to `on_beat`.
    pub fn frame(&mut self, input: &FrameInput<'_>, on_beat: &mut dyn FnMut(f32)) -> BeatReading {
        let started = Instant::now();

        let reading = self.detector.update(input.bins, input.now_ms);
        if reading.onset {
            self.field.spawn_beat(reading.instant / 255.0, &mut self.rng);
            self.stats.beats += 1;
            log::trace!("Beat at {:.0}ms (energy {:.1})", input.now_ms, reading.instant);
        }

        self.canvas.fade(BACKGROUND_FADE);
        self.field.advance();

        self.hue = (self.hue + HUE_DRIFT_PER_FRAME) % 360.0;
        let tips = self.spectrum.draw(&mut self.canvas, input.bins, self.hue + 180.0);
        if !self.skip_tips {
            for tip in tips {
                if self.rng.gen::<f32>() < self.tip_chance {
                    self.field.spawn_tip(tip.x, tip.y, tip.hue, &mut self.rng);
                }
            }
        }
        self.field.draw(&mut self.canvas);

        on_beat(reading.energy);

        let elapsed = started.elapsed();
        self.skip_tips = elapsed > self.frame_budget;
        if self.skip_tips {
            self.stats.over_budget += 1;
        }
        self.stats.slowest = self.stats.slowest.max(elapsed);
        self.stats.frames += 1;

        reading
    }

    /// Clears animation state.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.field.clear();
        self.skip_tips = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// Playback stopped and every animation has finished.
    Drained,
}

/// Drives a [`Visualizer`] one tick at a time until cancelled or drained.
pub struct RenderLoop {
    visualizer: Visualizer,
    token: CancelToken,
}

impl RenderLoop {
    pub fn new(visualizer: Visualizer, token: CancelToken) -> Self {
        Self { visualizer, token }
    }

    pub fn visualizer(&self) -> &Visualizer {
        &self.visualizer
    }

    /// Draws one frame unless cancelled. Breaks with `Drained` after the last
    /// frame that needs drawing.
    pub fn tick(&mut self, input: &FrameInput<'_>, on_beat: &mut dyn FnMut(f32)) -> ControlFlow<LoopExit> {
        if self.token.is_cancelled() {
            self.visualizer.reset();
            return ControlFlow::Break(LoopExit::Cancelled);
        }

        self.visualizer.frame(input, on_beat);

        if !input.playing && self.visualizer.is_idle() {
            ControlFlow::Break(LoopExit::Drained)
        } else {
            ControlFlow::Continue(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> VisualSettings {
        VisualSettings {
            width: 160,
            height: 90,
            fps: 60,
            bar_count: 16,
            max_particles: 400,
            tip_chance: 1.0,
            seed: Some(3),
        }
    }

    fn input(bins: &[u8], frame: usize, playing: bool) -> FrameInput<'_> {
        FrameInput {
            bins,
            now_ms: frame as f64 * 1000.0 / 60.0,
            playing,
        }
    }

    #[test]
    fn beat_spawns_and_reports_energy() {
        let mut visualizer = Visualizer::new(&settings()).unwrap();
        let quiet = vec![40u8; 256];
        let mut loud = quiet.clone();
        loud[1..12].fill(230);

        let mut reported = Vec::new();
        for frame in 0..40 {
            visualizer.frame(&input(&quiet, frame, true), &mut |e| reported.push(e));
        }
        assert!(visualizer.field().shockwaves().is_empty());
        let reading = visualizer.frame(&input(&loud, 40, true), &mut |e| reported.push(e));

        assert!(reading.onset);
        assert_eq!(visualizer.field().shockwaves().len(), 1);
        assert_eq!(visualizer.stats().beats, 1);
        assert_eq!(reported.len(), 41);
        assert_eq!(*reported.last().unwrap(), reading.energy);
    }

    #[test]
    fn over_budget_frame_skips_next_tip_spawns() {
        let mut bins = vec![0u8; 256];
        bins[64..].fill(250);

        let mut slow = Visualizer::new(&settings()).unwrap().with_frame_budget(Duration::ZERO);
        slow.frame(&input(&bins, 0, true), &mut |_| {});
        let after_first = slow.field().particles().len();
        assert!(after_first > 0);
        slow.frame(&input(&bins, 1, true), &mut |_| {});
        assert_eq!(slow.field().particles().len(), after_first);
        assert_eq!(slow.stats().over_budget, 2);

        let mut fast = Visualizer::new(&settings()).unwrap().with_frame_budget(Duration::from_secs(60));
        fast.frame(&input(&bins, 0, true), &mut |_| {});
        let first = fast.field().particles().len();
        fast.frame(&input(&bins, 1, true), &mut |_| {});
        assert!(fast.field().particles().len() > first);
        assert_eq!(fast.stats().over_budget, 0);
    }

    #[test]
    fn loop_drains_animations_after_playback_stops() {
        let token = CancelToken::new();
        let mut render_loop = RenderLoop::new(Visualizer::new(&settings()).unwrap(), token);
        let quiet = vec![40u8; 256];
        let mut loud = quiet.clone();
        loud[1..12].fill(230);

        for frame in 0..40 {
            assert!(render_loop.tick(&input(&quiet, frame, true), &mut |_| {}).is_continue());
        }
        assert!(render_loop.tick(&input(&loud, 40, true), &mut |_| {}).is_continue());

        let silent = vec![0u8; 256];
        let mut frame = 41;
        let exit = loop {
            if let ControlFlow::Break(exit) = render_loop.tick(&input(&silent, frame, false), &mut |_| {}) {
                break exit;
            }
            frame += 1;
            assert!(frame < 1_000, "never drained");
        };
        assert_eq!(exit, LoopExit::Drained);
        assert!(frame > 41);
        assert!(render_loop.visualizer().is_idle());
    }

    #[test]
    fn cancelled_loop_stops_without_drawing() {
        let token = CancelToken::new();
        let mut render_loop = RenderLoop::new(Visualizer::new(&settings()).unwrap(), token.clone());
        token.cancel();
        let bins = vec![0u8; 64];
        let flow = render_loop.tick(&input(&bins, 0, true), &mut |_| {});
        assert_eq!(flow, ControlFlow::Break(LoopExit::Cancelled));
        assert_eq!(render_loop.visualizer().stats().frames, 0);
    }

    #[test]
    fn idle_stopped_loop_exits_on_first_tick() {
        let mut render_loop = RenderLoop::new(Visualizer::new(&settings()).unwrap(), CancelToken::new());
        let bins = vec![0u8; 64];
        let flow = render_loop.tick(&input(&bins, 0, false), &mut |_| {});
        assert_eq!(flow, ControlFlow::Break(LoopExit::Drained));
    }
}
