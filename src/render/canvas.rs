//! Drawing surface abstraction.
//!
//! The renderer issues calls in logical pixels; a surface applies its own
//! device pixel ratio. [`DrawList`] records calls for tests and for the
//! remote snapshot endpoint's summary.

use crate::core::color::Rgb;

/// 8-bit color with straight alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// CSS-style `rgba(r,g,b,alpha)` with alpha in 0..1
    pub fn with_alpha(r: u8, g: u8, b: u8, alpha: f32) -> Self {
        Self {
            r,
            g,
            b,
            a: (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }
}

impl From<Rgb> for Rgba {
    fn from(c: Rgb) -> Self {
        Rgba::opaque(c.r, c.g, c.b)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Right,
}

/// Axis-aligned rectangle in logical pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

pub trait Canvas {
    /// Set the logical size and device pixel ratio; contents are undefined
    /// afterwards until redrawn
    fn resize(&mut self, width: u32, height: u32, dpr: f32);
    fn size(&self) -> (u32, u32);
    fn fill_rect(&mut self, rect: Rect, color: Rgba);
    fn stroke_rect(&mut self, rect: Rect, line_width: f32, color: Rgba);
    /// Horizontal or vertical line
    fn line(&mut self, from: (f32, f32), to: (f32, f32), line_width: f32, color: Rgba);
    /// `(x, y)` is the text baseline start (or end for right-aligned)
    fn text(&mut self, x: f32, y: f32, text: &str, size: f32, color: Rgba, align: TextAlign);
}

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Resize { width: u32, height: u32, dpr: f32 },
    Fill(Rect, Rgba),
    Stroke(Rect, f32, Rgba),
    Line((f32, f32), (f32, f32), Rgba),
    Text { x: f32, y: f32, text: String },
}

/// Recording canvas
#[derive(Debug, Default)]
pub struct DrawList {
    pub ops: Vec<DrawOp>,
    size: (u32, u32),
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fills(&self) -> impl Iterator<Item = (&Rect, &Rgba)> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Fill(r, c) => Some((r, c)),
            _ => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn strokes(&self) -> impl Iterator<Item = (&Rect, &Rgba)> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Stroke(r, _, c) => Some((r, c)),
            _ => None,
        })
    }

    pub fn lines(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Line(..)))
            .count()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

impl Canvas for DrawList {
    fn resize(&mut self, width: u32, height: u32, dpr: f32) {
        self.size = (width, height);
        self.ops.push(DrawOp::Resize { width, height, dpr });
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        self.ops.push(DrawOp::Fill(rect, color));
    }

    fn stroke_rect(&mut self, rect: Rect, line_width: f32, color: Rgba) {
        self.ops.push(DrawOp::Stroke(rect, line_width, color));
    }

    fn line(&mut self, from: (f32, f32), to: (f32, f32), _line_width: f32, color: Rgba) {
        self.ops.push(DrawOp::Line(from, to, color));
    }

    fn text(&mut self, x: f32, y: f32, text: &str, _size: f32, _color: Rgba, _align: TextAlign) {
        self.ops.push(DrawOp::Text {
            x,
            y,
            text: text.to_string(),
        });
    }
}
