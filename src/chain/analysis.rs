//! Coarse three-band reading of the post-mix spectrum.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::chain::engine::AudioEngine;
use crate::graph::nodes::analyser::AnalyserTap;

/// Mean byte magnitude (0-255) per band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioAnalysis {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

/// Bass is the first 5% of bins, mid the next 35%, treble the rest.
pub fn band_ranges(bins: usize) -> [Range<usize>; 3] {
    let bass_end = bins / 20;
    let mid_end = bins * 2 / 5;
    [0..bass_end, bass_end..mid_end, mid_end..bins]
}

pub fn analyse_bins(bins: &[u8]) -> AudioAnalysis {
    let [bass, mid, treble] = band_ranges(bins.len());
    AudioAnalysis {
        bass: mean(&bins[bass]),
        mid: mean(&bins[mid]),
        treble: mean(&bins[treble]),
    }
}

fn mean(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    bins.iter().map(|&b| b as u32).sum::<u32>() as f32 / bins.len() as f32
}

impl AudioEngine {
    /// Snapshot of the analyser at this instant, or `None` before build.
    pub fn get_audio_analysis(&self) -> Option<AudioAnalysis> {
        let tap = self.analyser()?;
        Some(analyse_bins(&tap.byte_frequency_data()))
    }

    pub fn analyser(&self) -> Option<AnalyserTap> {
        self.chain.as_ref().and_then(|chain| chain.analyser.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::media::MediaElement;
    use crate::audio::sink::NullSink;
    use crate::chain::engine::EngineSettings;
    use crate::chain::topology::NodeRole;

    const SR: u32 = 44_100;

    #[test]
    fn band_ranges_cover_every_bin_once() {
        for n in 0..600 {
            let [bass, mid, treble] = band_ranges(n);
            assert_eq!(bass.start, 0);
            assert_eq!(bass.end, mid.start);
            assert_eq!(mid.end, treble.start);
            assert_eq!(treble.end, n);
            assert_eq!(bass.end, (0.05 * n as f64).floor() as usize);
            assert_eq!(mid.end, (0.4 * n as f64).floor() as usize);
        }
    }

    #[test]
    fn band_ranges_for_default_analyser() {
        let [bass, mid, treble] = band_ranges(2048);
        assert_eq!(bass, 0..102);
        assert_eq!(mid, 102..819);
        assert_eq!(treble, 819..2048);
    }

    #[test]
    fn means_per_band() {
        let mut bins = vec![0u8; 100];
        bins[..5].fill(200);
        bins[5..40].fill(50);
        let analysis = analyse_bins(&bins);
        assert_eq!(analysis.bass, 200.0);
        assert_eq!(analysis.mid, 50.0);
        assert_eq!(analysis.treble, 0.0);
        assert_eq!(analyse_bins(&[]), AudioAnalysis::default());
    }

    #[test]
    fn no_analysis_before_build() {
        let engine = AudioEngine::new(SR, EngineSettings::default());
        assert!(engine.get_audio_analysis().is_none());
        assert!(engine.analyser().is_none());
    }

    fn tone(freq: f32, seconds: f32) -> MediaElement {
        let frames = (seconds * SR as f32) as usize;
        let samples: Vec<f32> = (0..frames)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect();
        MediaElement::from_channels(samples.clone(), samples, SR)
    }

    fn shaped_engine(media: &MediaElement) -> AudioEngine {
        let mut engine = AudioEngine::new(
            SR,
            EngineSettings {
                initial_volume: 1.0,
                seed: Some(42),
            },
        );
        engine.build(media);
        engine.resume_context();
        engine.set_band_gain(0, 8.0);
        engine.set_presence(-2.0);
        engine.set_reflection(0.2);
        engine
    }

    /// Renders about half a second, reading the analyser once per 60Hz frame.
    fn play(engine: &mut AudioEngine) -> AudioAnalysis {
        let mut last = None;
        for _ in 0..30 {
            engine.render(735, &mut NullSink).unwrap();
            last = engine.get_audio_analysis();
        }
        last.unwrap()
    }

    #[test]
    fn low_tone_lands_in_bass() {
        let media = tone(100.0, 1.0);
        let mut engine = shaped_engine(&media);
        let analysis = play(&mut engine);

        assert_eq!(engine.param(NodeRole::Wet, "gain").unwrap().target(), 0.2);
        assert!(analysis.bass > 20.0, "{analysis:?}");
        assert!(analysis.bass > analysis.mid * 4.0, "{analysis:?}");
        assert!(analysis.bass > analysis.treble * 4.0, "{analysis:?}");
    }

    #[test]
    fn mid_tone_lands_in_mid() {
        let media = tone(3_000.0, 1.0);
        let mut engine = shaped_engine(&media);
        let analysis = play(&mut engine);

        assert!(analysis.mid > 1.0, "{analysis:?}");
        assert!(analysis.mid > analysis.bass * 4.0, "{analysis:?}");
        assert!(analysis.mid > analysis.treble * 4.0, "{analysis:?}");
    }
}
