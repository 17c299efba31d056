//! Thread-safe parameter automation.
//!
//! An [`AudioParam`] is the control-side handle: any thread may retarget it
//! without locking. The node that owns the parameter holds a
//! [`ParamSmoother`] and approaches the latest target with an exponential
//! time constant, publishing the value it reached after every block.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Below this distance a smoother snaps onto its target.
const SETTLE_EPSILON: f32 = 1e-6;

/// `f32` stored in an `AtomicU32`.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

#[derive(Debug)]
struct ParamShared {
    name: &'static str,
    min: f32,
    max: f32,
    target: AtomicF32,
    time_constant: AtomicF32,
    value: AtomicF32,
}

/// Shared handle to a node parameter.
///
/// Target and time constant are two independent atomics. A block that reads
/// them between the two stores ramps toward the new target with the previous
/// time constant for that one block.
#[derive(Debug, Clone)]
pub struct AudioParam {
    shared: Arc<ParamShared>,
}

impl AudioParam {
    pub fn new(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        let default = default.clamp(min, max);
        Self {
            shared: Arc::new(ParamShared {
                name,
                min,
                max,
                target: AtomicF32::new(default),
                time_constant: AtomicF32::new(0.0),
                value: AtomicF32::new(default),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// The value the parameter is heading toward.
    pub fn target(&self) -> f32 {
        self.shared.target.load()
    }

    /// The value the owning node reached at the end of its last block.
    pub fn value(&self) -> f32 {
        self.shared.value.load()
    }

    pub fn time_constant(&self) -> f32 {
        self.shared.time_constant.load()
    }

    /// Starts an exponential approach from the current value toward `target`.
    ///
    /// A later call retargets from wherever the ramp has got to; ramps never
    /// queue. The target is clamped to the nominal range; a non-finite
    /// target or time constant is ignored.
    pub fn set_target_at_time(&self, target: f32, time_constant: f32) {
        if !target.is_finite() || !time_constant.is_finite() {
            log::warn!(
                "Ignoring {} = {} (time constant {}): not finite",
                self.shared.name,
                target,
                time_constant
            );
            return;
        }
        let target = target.clamp(self.shared.min, self.shared.max);
        self.shared.time_constant.store(time_constant.max(0.0));
        self.shared.target.store(target);
    }

    /// Jumps to `value` on the next processed sample.
    pub fn set_value(&self, value: f32) {
        self.set_target_at_time(value, 0.0);
    }

    /// Creates the processing-side smoother, starting at the published value.
    pub fn smoother(&self) -> ParamSmoother {
        ParamSmoother {
            current: self.value(),
            param: self.clone(),
        }
    }

    fn publish(&self, value: f32) {
        self.shared.value.store(value);
    }
}

/// Processing-side state of one [`AudioParam`].
#[derive(Debug)]
pub struct ParamSmoother {
    param: AudioParam,
    current: f32,
}

impl ParamSmoother {
    pub fn current(&self) -> f32 {
        self.current
    }

    #[cfg(test)]
    pub fn is_settled(&self) -> bool {
        (self.current - self.param.target()).abs() <= SETTLE_EPSILON
    }

    /// Writes one smoothed value per sample into `out`.
    pub fn fill(&mut self, out: &mut [f32], sample_rate: f32) {
        let target = self.param.target();
        let tau = self.param.time_constant();

        if self.is_at(target) || tau <= 0.0 {
            self.current = target;
            out.fill(target);
        } else {
            let k = 1.0 - (-1.0 / (tau * sample_rate)).exp();
            for slot in out.iter_mut() {
                self.current += (target - self.current) * k;
                *slot = self.current;
            }
            if self.is_at(target) {
                self.current = target;
            }
        }

        self.param.publish(self.current);
    }

    /// Advances `frames` samples at once and returns the value reached.
    pub fn advance(&mut self, frames: usize, sample_rate: f32) -> f32 {
        let target = self.param.target();
        let tau = self.param.time_constant();

        if tau <= 0.0 || self.is_at(target) {
            self.current = target;
        } else {
            let decay = (-(frames as f32) / (tau * sample_rate)).exp();
            self.current = target + (self.current - target) * decay;
            if self.is_at(target) {
                self.current = target;
            }
        }

        self.param.publish(self.current);
        self.current
    }

    fn is_at(&self, target: f32) -> bool {
        (self.current - target).abs() <= SETTLE_EPSILON
    }
}

/// Read-only value published by a node, e.g. compressor gain reduction.
#[derive(Debug, Clone, Default)]
pub struct Meter(Arc<AtomicF32>);

impl Meter {
    pub fn read(&self) -> f32 {
        self.0.load()
    }

    pub(crate) fn write(&self, value: f32) {
        self.0.store(value);
    }
}
