//! Parameter setters for a built chain.
//!
//! Every setter schedules a smoothed approach on the matching node parameter
//! and returns immediately. Before the chain is built they do nothing.

use crate::chain::engine::AudioEngine;
use crate::chain::topology::{NodeRole, BAND_COUNT};
use crate::graph::param::AudioParam;

/// Nominal equaliser and presence range in dB.
pub const BAND_GAIN_LIMIT: f32 = 12.0;

const VOLUME_TIME_CONSTANT: f32 = 0.01;
const PREAMP_TIME_CONSTANT: f32 = 0.03;
const TONE_TIME_CONSTANT: f32 = 0.05;
const PAN_TIME_CONSTANT: f32 = 0.05;
const REFLECTION_TIME_CONSTANT: f32 = 0.1;

pub(crate) fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// `None` for a gain that is not a number at all.
fn clamp_band_db(what: &str, db: f32) -> Option<f32> {
    if db.is_nan() {
        log::warn!("Ignoring {} gain: not a number", what);
        return None;
    }
    let clamped = db.clamp(-BAND_GAIN_LIMIT, BAND_GAIN_LIMIT);
    if clamped != db {
        log::warn!(
            "{} gain {:.2}dB outside ±{}dB, clamped to {:.2}dB",
            what,
            db,
            BAND_GAIN_LIMIT,
            clamped
        );
    }
    Some(clamped)
}

impl AudioEngine {
    /// Parameter handle by node role and local name, if the chain is built.
    pub fn param(&self, role: NodeRole, name: &str) -> Option<AudioParam> {
        self.chain
            .as_ref()
            .and_then(|chain| chain.params.get(role, name))
            .cloned()
    }

    fn ramp(&self, role: NodeRole, name: &str, target: f32, time_constant: f32) {
        match self.param(role, name) {
            Some(param) => param.set_target_at_time(target, time_constant),
            None => log::trace!("Ignoring {}.{} = {} before build", role, name, target),
        }
    }

    pub fn set_preamp(&self, db: f32) {
        self.ramp(NodeRole::PreAmp, "gain", db_to_linear(db), PREAMP_TIME_CONSTANT);
    }

    /// # Panics
    ///
    /// If `index` is not a band index.
    pub fn set_band_gain(&self, index: usize, db: f32) {
        assert!(index < BAND_COUNT, "band index {index} out of range 0..{BAND_COUNT}");
        if let Some(db) = clamp_band_db("Band", db) {
            self.ramp(NodeRole::Band(index), "gain", db, TONE_TIME_CONSTANT);
        }
    }

    /// Sets bands from the lowest up; extra values are ignored.
    pub fn set_eq(&self, gains: &[f32]) {
        for (index, &db) in gains.iter().take(BAND_COUNT).enumerate() {
            self.set_band_gain(index, db);
        }
    }

    pub fn set_presence(&self, db: f32) {
        if let Some(db) = clamp_band_db("Presence", db) {
            self.ramp(NodeRole::Presence, "gain", db, TONE_TIME_CONSTANT);
        }
    }

    /// Stereo placement, written to the panner's `pan` in [-1, 1]: -1 is hard
    /// left, 0 centred, 1 hard right. The chain has no width control of its own.
    pub fn set_stereo_width(&self, value: f32) {
        self.ramp(NodeRole::Panner, "pan", value, PAN_TIME_CONSTANT);
    }

    /// Linear level of the reflection path; the dry path stays at unity.
    pub fn set_reflection(&self, level: f32) {
        self.ramp(NodeRole::Wet, "gain", level, REFLECTION_TIME_CONSTANT);
    }

    pub fn set_volume(&self, value: f32) {
        self.ramp(NodeRole::Output, "gain", value, VOLUME_TIME_CONSTANT);
    }

    /// Applied to the media element, not to any node.
    pub fn set_playback_rate(&self, rate: f32) {
        match self.source() {
            Some(source) => source.set_playback_rate(rate),
            None => log::trace!("Ignoring playback rate {} before build", rate),
        }
    }

    /// Off is approximated by a 0dB threshold at 1:1, not a true bypass.
    pub fn set_limiter_enabled(&self, enabled: bool) {
        let (threshold, ratio) = if enabled { (-0.5, 20.0) } else { (0.0, 1.0) };
        let (Some(threshold_param), Some(ratio_param)) = (
            self.param(NodeRole::Limiter, "threshold"),
            self.param(NodeRole::Limiter, "ratio"),
        ) else {
            log::trace!("Ignoring limiter toggle before build");
            return;
        };
        threshold_param.set_value(threshold);
        ratio_param.set_value(ratio);
        log::debug!("Limiter {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Gain reduction currently applied by the limiter, in dB.
    pub fn limiter_reduction(&self) -> Option<f32> {
        self.chain
            .as_ref()
            .and_then(|chain| chain.reduction.as_ref())
            .map(|meter| meter.read())
    }
}
