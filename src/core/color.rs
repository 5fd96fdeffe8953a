//! RGBW → display RGB conversion.
//!
//! Show files drive a fourth warm-white channel that a screen cannot show
//! directly. The rule that must stay bit-compatible with existing shows:
//!
//! - `r = g = b = 0`: monochrome pixel. Below `white_floor` it is treated as
//!   off, otherwise it becomes neutral gray `min(255, w * white_scale)`.
//! - any RGB channel set: `w` is either ignored or added to every channel at a
//!   fixed mix ratio, depending on [`WhiteBlend`].

use serde::{Deserialize, Serialize};

/// Displayable 8-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(v: u8) -> Self {
        Self { r: v, g: v, b: v }
    }

    pub fn is_neutral(&self) -> bool {
        self.r == self.g && self.g == self.b
    }
}

/// How the white channel combines with non-zero RGB
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WhiteBlend {
    /// RGB shown as-is, W dropped
    Ignore,
    /// Each channel gets `w * mix`, clamped to 255
    Additive { mix: f32 },
}

impl Default for WhiteBlend {
    fn default() -> Self {
        WhiteBlend::Additive { mix: 0.2 }
    }
}

/// Switchable RGBW decoding policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorPolicy {
    /// Monochrome pixels with `w` below this are rendered black
    pub white_floor: u8,
    /// Gray level = `w * white_scale`
    pub white_scale: f32,
    pub blend: WhiteBlend,
}

impl Default for ColorPolicy {
    fn default() -> Self {
        Self {
            white_floor: 20,
            white_scale: 0.5,
            blend: WhiteBlend::default(),
        }
    }
}

impl ColorPolicy {
    /// Policy that ignores W whenever any RGB channel is lit
    pub fn ignore_white() -> Self {
        Self {
            blend: WhiteBlend::Ignore,
            ..Self::default()
        }
    }

    pub fn to_display_color(&self, r: u8, g: u8, b: u8, w: u8) -> Rgb {
        if r == 0 && g == 0 && b == 0 {
            if w == 0 || w < self.white_floor {
                return Rgb::BLACK;
            }
            return Rgb::gray(scale_channel(w as f32 * self.white_scale));
        }

        match self.blend {
            WhiteBlend::Ignore => Rgb::new(r, g, b),
            WhiteBlend::Additive { mix } => {
                if w == 0 {
                    return Rgb::new(r, g, b);
                }
                let add = w as f32 * mix;
                Rgb::new(
                    scale_channel(r as f32 + add),
                    scale_channel(g as f32 + add),
                    scale_channel(b as f32 + add),
                )
            }
        }
    }

    /// Decode the pixel addressed by `pxld_id` from an RGBW buffer.
    ///
    /// Returns None when the id is negative or the 4-byte slot is not fully
    /// inside the buffer.
    pub fn pixel_at(&self, rgbw: &[u8], pxld_id: i32) -> Option<Rgb> {
        if pxld_id < 0 {
            return None;
        }
        let offset = pxld_id as usize * 4;
        let px = rgbw.get(offset..offset + 4)?;
        Some(self.to_display_color(px[0], px[1], px[2], px[3]))
    }
}

#[inline]
fn scale_channel(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_only_pixel_is_neutral_gray() {
        for policy in [ColorPolicy::default(), ColorPolicy::ignore_white()] {
            let c = policy.to_display_color(0, 0, 0, 128);
            assert!(c.is_neutral());
            assert_eq!(c, Rgb::gray(64));
        }
    }

    #[test]
    fn test_white_gray_clamps() {
        let policy = ColorPolicy {
            white_scale: 2.0,
            ..ColorPolicy::default()
        };
        assert_eq!(policy.to_display_color(0, 0, 0, 200), Rgb::gray(255));
    }

    #[test]
    fn test_white_below_floor_is_black() {
        let policy = ColorPolicy::default();
        assert_eq!(policy.to_display_color(0, 0, 0, 19), Rgb::BLACK);
        assert_eq!(policy.to_display_color(0, 0, 0, 20), Rgb::gray(10));

        let no_floor = ColorPolicy {
            white_floor: 0,
            ..ColorPolicy::default()
        };
        assert_eq!(no_floor.to_display_color(0, 0, 0, 4), Rgb::gray(2));
        assert_eq!(no_floor.to_display_color(0, 0, 0, 0), Rgb::BLACK);
    }

    #[test]
    fn test_rgb_without_white_unchanged() {
        for policy in [ColorPolicy::default(), ColorPolicy::ignore_white()] {
            assert_eq!(policy.to_display_color(10, 0, 0, 0), Rgb::new(10, 0, 0));
        }
    }

    #[test]
    fn test_rgb_with_white_depends_on_blend() {
        let additive = ColorPolicy::default();
        assert_eq!(additive.to_display_color(10, 0, 250, 100), Rgb::new(30, 20, 255));

        let ignore = ColorPolicy::ignore_white();
        assert_eq!(ignore.to_display_color(10, 0, 250, 100), Rgb::new(10, 0, 250));
    }

    #[test]
    fn test_pixel_at_bounds() {
        let policy = ColorPolicy::ignore_white();
        let buf = [1, 2, 3, 0, 9, 8, 7, 0];
        assert_eq!(policy.pixel_at(&buf, 0), Some(Rgb::new(1, 2, 3)));
        assert_eq!(policy.pixel_at(&buf, 1), Some(Rgb::new(9, 8, 7)));
        assert_eq!(policy.pixel_at(&buf, 2), None);
        assert_eq!(policy.pixel_at(&buf, -1), None);
        assert_eq!(policy.pixel_at(&buf[..7], 1), None);
    }
}
