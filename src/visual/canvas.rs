//! RGBA frame canvas backed by a `tiny_skia` pixmap.
//!
//! The background is always opaque, so the premultiplied pixmap bytes are
//! plain RGBA and go to the encoder as they are.

use thiserror::Error;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

/// Straight-alpha RGBA colour.
pub type Rgba = [u8; 4];

#[derive(Debug, Error)]
#[error("cannot allocate a {width}x{height} canvas")]
pub struct CanvasError {
    pub width: u32,
    pub height: u32,
}

pub struct Canvas {
    pixmap: Pixmap,
}

fn paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        let mut pixmap = Pixmap::new(width, height).ok_or(CanvasError { width, height })?;
        pixmap.fill(Color::BLACK);
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data()
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        let c = self.pixmap.pixel(x, y).unwrap().demultiply();
        [c.red(), c.green(), c.blue(), c.alpha()]
    }

    #[cfg(test)]
    pub fn clear(&mut self, color: Rgba) {
        self.pixmap.fill(Color::from_rgba8(color[0], color[1], color[2], 255));
    }

    /// Blends `color` over the whole canvas, leaving motion trails.
    pub fn fade(&mut self, color: Rgba) {
        let (w, h) = (self.width() as f32, self.height() as f32);
        self.fill_rect(0.0, 0.0, w, h, color);
    }

    /// Degenerate rectangles draw nothing; the rest is clipped to the canvas.
    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba) {
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            self.pixmap
                .fill_rect(rect, &paint(color), Transform::identity(), None);
        }
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba) {
        if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
            self.pixmap.fill_path(
                &path,
                &paint(color),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
    }

    pub fn stroke_ring(&mut self, cx: f32, cy: f32, radius: f32, width: f32, color: Rgba) {
        let Some(path) = PathBuilder::from_circle(cx, cy, radius) else {
            return;
        };
        let stroke = Stroke {
            width: width.max(0.5),
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint(color), &stroke, Transform::identity(), None);
    }
}

/// `h` in degrees, `s` and `l` in [0, 1].
pub fn hsl(h: f32, s: f32, l: f32, alpha: f32) -> Rgba {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_byte = |v: f32| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    [
        to_byte(r),
        to_byte(g),
        to_byte(b),
        (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
    ]
}
