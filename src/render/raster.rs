//! Software canvas backed by an RGBA image.
//!
//! Uses cosmic-text for labels and the HUD, with the font system shared
//! process-wide (expensive to create). Rectangles are alpha-blended
//! source-over; lines are axis-aligned bars.

use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;

use cosmic_text::{Attrs as TextAttrs, Buffer, Color, Family, FontSystem, Metrics, Shaping, SwashCache};
use image::{ImageFormat, Rgba as Pixel, RgbaImage};
use log::debug;

use super::canvas::{Canvas, Rect, Rgba, TextAlign};

// Global font system (expensive to create, reuse across all canvases)
lazy_static::lazy_static! {
    static ref FONT_SYSTEM: Mutex<FontSystem> = Mutex::new(FontSystem::new());
    static ref SWASH_CACHE: Mutex<SwashCache> = Mutex::new(SwashCache::new());
}

pub struct RasterCanvas {
    image: RgbaImage,
    logical: (u32, u32),
    dpr: f32,
}

impl Default for RasterCanvas {
    fn default() -> Self {
        Self {
            image: RgbaImage::new(1, 1),
            logical: (1, 1),
            dpr: 1.0,
        }
    }
}

impl RasterCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Device pixel at (x, y) as `[r, g, b, a]`
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        (x < self.image.width() && y < self.image.height()).then(|| self.image.get_pixel(x, y).0)
    }

    pub fn save_png(&self, path: &Path) -> image::ImageResult<()> {
        self.image.save_with_format(path, ImageFormat::Png)
    }

    pub fn to_png(&self) -> image::ImageResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Logical rect → clamped device pixel span `[x0, x1) x [y0, y1)`
    fn span(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let (w, h) = (self.image.width() as f32, self.image.height() as f32);
        let x0 = (rect.x * self.dpr).round().clamp(0.0, w);
        let y0 = (rect.y * self.dpr).round().clamp(0.0, h);
        let x1 = ((rect.x + rect.w) * self.dpr).round().clamp(0.0, w);
        let y1 = ((rect.y + rect.h) * self.dpr).round().clamp(0.0, h);
        (x1 > x0 && y1 > y0).then_some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    fn blend(&mut self, x: u32, y: u32, c: Rgba) {
        if c.a == 0 {
            return;
        }
        let px = self.image.get_pixel_mut(x, y);
        if c.a == 255 {
            *px = Pixel([c.r, c.g, c.b, 255]);
            return;
        }
        let src_a = c.a as f32 / 255.0;
        let dst_a = px.0[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        if out_a <= 0.0 {
            return;
        }
        let mix = |s: u8, d: u8| -> u8 {
            let v = (s as f32 * src_a + d as f32 * dst_a * (1.0 - src_a)) / out_a;
            v.round().clamp(0.0, 255.0) as u8
        };
        let [r, g, b, _] = px.0;
        *px = Pixel([mix(c.r, r), mix(c.g, g), mix(c.b, b), (out_a * 255.0).round() as u8]);
    }
}

impl Canvas for RasterCanvas {
    fn resize(&mut self, width: u32, height: u32, dpr: f32) {
        let dpr = if dpr > 0.0 { dpr } else { 1.0 };
        let dw = ((width.max(1) as f32) * dpr).ceil() as u32;
        let dh = ((height.max(1) as f32) * dpr).ceil() as u32;
        if (dw, dh) != self.image.dimensions() {
            debug!("RasterCanvas resize: {}x{} @ {} -> {}x{}", width, height, dpr, dw, dh);
            self.image = RgbaImage::new(dw, dh);
        }
        self.logical = (width.max(1), height.max(1));
        self.dpr = dpr;
    }

    fn size(&self) -> (u32, u32) {
        self.logical
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        let Some((x0, y0, x1, y1)) = self.span(rect) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend(x, y, color);
            }
        }
    }

    fn stroke_rect(&mut self, rect: Rect, line_width: f32, color: Rgba) {
        let half = line_width / 2.0;
        let Rect { x, y, w, h } = rect;
        self.fill_rect(Rect::new(x - half, y - half, w + line_width, line_width), color);
        self.fill_rect(Rect::new(x - half, y + h - half, w + line_width, line_width), color);
        self.fill_rect(Rect::new(x - half, y + half, line_width, h - line_width), color);
        self.fill_rect(Rect::new(x + w - half, y + half, line_width, h - line_width), color);
    }

    fn line(&mut self, from: (f32, f32), to: (f32, f32), line_width: f32, color: Rgba) {
        // Thin lines still cover one device pixel
        let lw = line_width.max(1.0 / self.dpr);
        let half = lw / 2.0;
        if (from.1 - to.1).abs() < f32::EPSILON {
            let x = from.0.min(to.0);
            self.fill_rect(Rect::new(x, from.1 - half, (to.0 - from.0).abs(), lw), color);
        } else if (from.0 - to.0).abs() < f32::EPSILON {
            let y = from.1.min(to.1);
            self.fill_rect(Rect::new(from.0 - half, y, lw, (to.1 - from.1).abs()), color);
        } else {
            let len = ((to.0 - from.0).powi(2) + (to.1 - from.1).powi(2)).sqrt();
            let steps = (len * self.dpr).ceil().max(1.0) as u32;
            for i in 0..=steps {
                let t = i as f32 / steps as f32;
                let px = from.0 + (to.0 - from.0) * t;
                let py = from.1 + (to.1 - from.1) * t;
                self.fill_rect(Rect::new(px - half, py - half, lw, lw), color);
            }
        }
    }

    fn text(&mut self, x: f32, y: f32, text: &str, size: f32, color: Rgba, align: TextAlign) {
        if text.is_empty() {
            return;
        }
        let mut font_system = FONT_SYSTEM.lock().unwrap_or_else(|e| e.into_inner());
        let mut swash_cache = SWASH_CACHE.lock().unwrap_or_else(|e| e.into_inner());

        let font_size = size * self.dpr;
        let metrics = Metrics::new(font_size, font_size * 1.2);
        let mut buffer = Buffer::new(&mut font_system, metrics);
        buffer.set_size(&mut font_system, Some(4096.0), None);
        let attrs = TextAttrs::new().family(Family::Monospace);
        buffer.set_text(&mut font_system, text, &attrs, Shaping::Advanced, None);
        buffer.shape_until_scroll(&mut font_system, false);

        let mut text_width = 0.0f32;
        let mut baseline = None;
        for run in buffer.layout_runs() {
            for glyph in run.glyphs.iter() {
                text_width = text_width.max(glyph.x + glyph.w);
            }
            baseline.get_or_insert(run.line_y);
        }
        let baseline = baseline.unwrap_or(font_size);

        let mut ox = x * self.dpr;
        if align == TextAlign::Right {
            ox -= text_width;
        }
        let oy = y * self.dpr - baseline;

        let text_color = Color::rgba(color.r, color.g, color.b, color.a);
        let (iw, ih) = (self.image.width() as i32, self.image.height() as i32);
        let mut coverage: Vec<(u32, u32, Rgba)> = Vec::new();
        buffer.draw(&mut font_system, &mut swash_cache, text_color, |gx, gy, w, h, c| {
            if c.a() == 0 {
                return;
            }
            for dy in 0..h as i32 {
                for dx in 0..w as i32 {
                    let px = ox as i32 + gx + dx;
                    let py = oy as i32 + gy + dy;
                    if px < 0 || py < 0 || px >= iw || py >= ih {
                        continue;
                    }
                    coverage.push((px as u32, py as u32, Rgba::new(c.r(), c.g(), c.b(), c.a())));
                }
            }
        });
        drop(swash_cache);
        drop(font_system);
        for (px, py, c) in coverage {
            self.blend(px, py, c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_applies_dpr() {
        let mut c = RasterCanvas::new();
        c.resize(10, 4, 2.0);
        assert_eq!(c.image().dimensions(), (20, 8));
        assert_eq!(c.size(), (10, 4));
    }

    #[test]
    fn test_fill_and_blend() {
        let mut c = RasterCanvas::new();
        c.resize(4, 4, 1.0);
        c.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), Rgba::opaque(100, 0, 0));
        c.fill_rect(Rect::new(1.0, 1.0, 1.0, 1.0), Rgba::new(0, 0, 200, 128));
        assert_eq!(c.pixel(0, 0), Some([100, 0, 0, 255]));
        let [r, _, b, a] = c.pixel(1, 1).unwrap();
        assert_eq!(a, 255);
        assert!(r > 40 && r < 60);
        assert!(b > 90 && b < 110);
        assert_eq!(c.pixel(4, 0), None);
    }

    #[test]
    fn test_fill_clips_outside() {
        let mut c = RasterCanvas::new();
        c.resize(2, 2, 1.0);
        c.fill_rect(Rect::new(-5.0, -5.0, 6.0, 6.0), Rgba::opaque(1, 2, 3));
        assert_eq!(c.pixel(0, 0), Some([1, 2, 3, 255]));
        assert_eq!(c.pixel(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_axis_lines() {
        let mut c = RasterCanvas::new();
        c.resize(8, 8, 1.0);
        c.line((0.0, 4.5), (8.0, 4.5), 1.0, Rgba::opaque(9, 9, 9));
        assert_eq!(c.pixel(3, 4), Some([9, 9, 9, 255]));
        assert_eq!(c.pixel(3, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_png_encoding() {
        let mut c = RasterCanvas::new();
        c.resize(3, 3, 1.0);
        let png = c.to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
