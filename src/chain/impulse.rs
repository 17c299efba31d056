//! Synthetic room reflections.
//!
//! Two channels of independent white noise under a squared linear decay.
//! Generated once per chain from the context sample rate and never
//! regenerated; a device sample-rate change after construction is not
//! picked up.

use rand::Rng;

/// Length of the reflection tail.
pub const REFLECTION_SECONDS: f32 = 2.5;

#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    sample_rate: u32,
    channels: [Vec<f32>; 2],
}

impl ImpulseResponse {
    pub fn generate<R: Rng + ?Sized>(duration: f32, sample_rate: u32, rng: &mut R) -> Self {
        let length = (duration as f64 * sample_rate as f64) as usize;
        let mut channel = || -> Vec<f32> {
            (0..length)
                .map(|i| (rng.gen::<f32>() * 2.0 - 1.0) * envelope(i, length))
                .collect()
        };
        let left = channel();
        let right = channel();

        log::debug!(
            "Generated {:.2}s impulse response ({} frames @ {}Hz)",
            duration,
            length,
            sample_rate
        );

        Self {
            sample_rate,
            channels: [left, right],
        }
    }

    pub fn from_channels(sample_rate: u32, left: Vec<f32>, right: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: [left, right],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }
}

/// Decay envelope `(1 - i/length)^2`.
pub fn envelope(position: usize, length: usize) -> f32 {
    if length == 0 {
        return 0.0;
    }
    let remaining = 1.0 - position as f32 / length as f32;
    remaining * remaining
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn length_follows_duration_and_rate() {
        let mut rng = StdRng::seed_from_u64(7);
        let ir = ImpulseResponse::generate(REFLECTION_SECONDS, 48_000, &mut rng);
        assert_eq!(ir.len(), 120_000);
        assert_eq!(ir.channel(1).len(), 120_000);
        assert_eq!(ir.sample_rate(), 48_000);
    }

    #[test]
    fn envelope_decays_from_one_to_zero() {
        assert_eq!(envelope(0, 120_000), 1.0);
        assert!(envelope(119_999, 120_000) < 1e-9);
        assert!((envelope(60_000, 120_000) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn samples_respect_envelope() {
        let mut rng = StdRng::seed_from_u64(11);
        let ir = ImpulseResponse::generate(REFLECTION_SECONDS, 48_000, &mut rng);
        for channel in 0..2 {
            let samples = ir.channel(channel);
            let head_peak = samples[..1000].iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(head_peak > 0.9 && head_peak <= 1.0);
            assert!(samples[samples.len() - 100..].iter().all(|s| s.abs() < 1e-6));
            for (i, s) in samples.iter().enumerate().step_by(997) {
                assert!(s.abs() <= envelope(i, samples.len()) + 1e-6);
            }
        }
    }

    #[test]
    fn channels_are_decorrelated() {
        let mut rng = StdRng::seed_from_u64(3);
        let ir = ImpulseResponse::generate(0.5, 44_100, &mut rng);
        assert_ne!(ir.channel(0), ir.channel(1));
    }
}
