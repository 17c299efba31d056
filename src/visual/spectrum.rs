//! Mirrored bar spectrum.

use crate::visual::canvas::{hsl, Canvas};

pub const DEFAULT_BAR_COUNT: usize = 64;
/// Gain on the upper half of the bars so treble reads as loud as bass.
const UPPER_HALF_BOOST: f32 = 1.25;
/// Bars above this level may shed particles from their tips.
pub const TIP_THRESHOLD: f32 = 204.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarTip {
    pub x: f32,
    pub y: f32,
    pub magnitude: f32,
    pub hue: f32,
}

/// Samples `bar_count` bins at even strides across the spectrum.
pub fn sample_bars(bins: &[u8], bar_count: usize, out: &mut Vec<f32>) {
    out.clear();
    if bins.is_empty() || bar_count == 0 {
        out.resize(bar_count, 0.0);
        return;
    }
    let stride = (bins.len() / bar_count).max(1);
    for i in 0..bar_count {
        let value = bins.get(i * stride).copied().unwrap_or(0) as f32;
        let value = if i >= bar_count / 2 {
            (value * UPPER_HALF_BOOST).min(255.0)
        } else {
            value
        };
        out.push(value);
    }
}

pub struct Spectrum {
    bar_count: usize,
    bars: Vec<f32>,
}

impl Spectrum {
    pub fn new(bar_count: usize) -> Self {
        Self {
            bar_count,
            bars: Vec::with_capacity(bar_count),
        }
    }

    pub fn bars(&self) -> &[f32] {
        &self.bars
    }

    /// Draws the bars mirrored around the vertical centre line and returns
    /// the tips of bars above [`TIP_THRESHOLD`].
    pub fn draw(&mut self, canvas: &mut Canvas, bins: &[u8], hue_shift: f32) -> Vec<BarTip> {
        sample_bars(bins, self.bar_count, &mut self.bars);

        let width = canvas.width() as f32;
        let height = canvas.height() as f32;
        let centre = width * 0.5;
        let slot = centre / self.bar_count.max(1) as f32;
        let bar_width = (slot * 0.7).max(1.0);
        let max_height = height * 0.45;
        let base = height;

        let mut tips = Vec::new();
        for (i, &value) in self.bars.iter().enumerate() {
            let magnitude = value / 255.0;
            let bar_height = magnitude * max_height;
            if bar_height < 0.5 {
                continue;
            }
            let hue = hue_shift + i as f32 / self.bar_count as f32 * 180.0;
            let color = hsl(hue, 0.85, 0.35 + 0.3 * magnitude, 0.9);
            let offset = i as f32 * slot;
            let top = base - bar_height;

            canvas.fill_rect(centre + offset, top, bar_width, bar_height, color);
            canvas.fill_rect(centre - offset - bar_width, top, bar_width, bar_height, color);

            if value > TIP_THRESHOLD {
                let right = centre + offset + bar_width * 0.5;
                let left = centre - offset - bar_width * 0.5;
                for x in [left, right] {
                    tips.push(BarTip {
                        x,
                        y: top,
                        magnitude: value,
                        hue,
                    });
                }
            }
        }
        tips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_at_even_strides() {
        let bins: Vec<u8> = (0..128).map(|i| i as u8).collect();
        let mut bars = Vec::new();
        sample_bars(&bins, 8, &mut bars);
        assert_eq!(bars.len(), 8);
        assert_eq!(&bars[..4], &[0.0, 16.0, 32.0, 48.0]);
        assert_eq!(bars[4], 64.0 * 1.25);
    }

    #[test]
    fn boost_is_capped_at_full_scale() {
        let bins = vec![250u8; 64];
        let mut bars = Vec::new();
        sample_bars(&bins, 4, &mut bars);
        assert_eq!(bars, vec![250.0, 250.0, 255.0, 255.0]);
    }

    #[test]
    fn short_spectra_pad_with_silence() {
        let mut bars = Vec::new();
        sample_bars(&[], 4, &mut bars);
        assert_eq!(bars, vec![0.0; 4]);
        sample_bars(&[10, 20], 4, &mut bars);
        assert_eq!(bars, vec![10.0, 20.0, 0.0, 0.0]);
    }

    #[test]
    fn only_loud_bars_report_tips() {
        let mut canvas = Canvas::new(256, 128).unwrap();
        let mut spectrum = Spectrum::new(4);
        let mut bins = vec![0u8; 64];
        bins[0] = 250;
        bins[16] = 100;
        let tips = spectrum.draw(&mut canvas, &bins, 0.0);
        assert_eq!(tips.len(), 2);
        assert!(tips.iter().all(|t| t.magnitude == 250.0));
        assert!(tips[0].x < 128.0 && tips[1].x > 128.0);
    }

    #[test]
    fn draws_mirrored() {
        let mut canvas = Canvas::new(200, 100).unwrap();
        let mut spectrum = Spectrum::new(2);
        spectrum.draw(&mut canvas, &[255, 0, 0, 0], 0.0);
        assert_ne!(canvas.pixel(102, 99), [0, 0, 0, 255]);
        assert_ne!(canvas.pixel(97, 99), [0, 0, 0, 255]);
        assert_eq!(canvas.pixel(102, 10), [0, 0, 0, 255]);
    }
}
