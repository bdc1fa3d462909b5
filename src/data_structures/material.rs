//! Surface appearance: colours, materials and texture references.
//!
//! Materials are plain CPU data. The renderer mirrors them into uniform
//! buffers every frame, so mutating a field here is all it takes to change
//! what ends up on screen.

use std::sync::Arc;

use anyhow::{anyhow, Context};

/// An sRGB colour with components in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);
    pub const RED: Color = Color::new(1.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Build a colour from a `0xRRGGBB` literal.
    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| ((hex >> shift) & 0xff) as f32 / 255.0;
        Self::new(channel(16), channel(8), channel(0))
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let digits = text.trim().trim_start_matches('#');
        if digits.len() != 6 {
            return Err(anyhow!("expected six hex digits in colour {:?}", text));
        }
        let hex = u32::from_str_radix(digits, 16)
            .with_context(|| format!("invalid colour {:?}", text))?;
        Ok(Self::from_hex(hex))
    }

    pub fn to_hex(&self) -> u32 {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        channel(self.r) << 16 | channel(self.g) << 8 | channel(self.b)
    }

    /// Hue in `[0, 1)`, saturation and value in `[0, 1]`.
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let h = h.rem_euclid(1.0) * 6.0;
        let sector = h.floor();
        let f = h - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        match sector as u32 {
            0 => Self::new(v, t, p),
            1 => Self::new(q, v, p),
            2 => Self::new(p, v, t),
            3 => Self::new(p, q, v),
            4 => Self::new(t, p, v),
            _ => Self::new(v, p, q),
        }
    }

    /// Hue of this colour in `[0, 1)`. Greys report a hue of zero.
    pub fn hue(&self) -> f32 {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let delta = max - min;
        if delta <= f32::EPSILON {
            return 0.0;
        }
        let h = if max == self.r {
            ((self.g - self.b) / delta).rem_euclid(6.0)
        } else if max == self.g {
            (self.b - self.r) / delta + 2.0
        } else {
            (self.r - self.g) / delta + 4.0
        };
        h / 6.0
    }

    /// Linear-light components for shading on an sRGB surface.
    pub fn to_linear(&self) -> [f32; 3] {
        let decode = |c: f32| {
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        };
        [decode(self.r), decode(self.g), decode(self.b)]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Index into the texture table of a [`SceneGraph`](super::scene_graph::SceneGraph).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// A decoded image waiting to be uploaded.
#[derive(Clone, Debug)]
pub struct TextureImage {
    pub label: String,
    pub image: image::RgbaImage,
}

impl TextureImage {
    /// One white texel, used wherever an image failed to load.
    pub fn placeholder(label: &str) -> Self {
        Self {
            label: label.to_string(),
            image: image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255])),
        }
    }
}

/// Which faces of a triangle are drawn (and hit by rays).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// Two opaque WGSL sources: `vs_main` lives in `vertex`, `fs_main` in `fragment`.
#[derive(Debug, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

#[derive(Clone, Debug)]
pub enum Shading {
    /// Unlit, flat colour or texture.
    Basic,
    /// Lit by the ambient and spot lights.
    Standard,
    /// User supplied vertex and fragment stages.
    Shader(Arc<ShaderSource>),
}

#[derive(Clone, Debug)]
pub struct Material {
    pub shading: Shading,
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    pub wireframe: bool,
    pub side: Side,
    pub map: Option<TextureId>,
}

impl Material {
    pub fn basic(color: Color) -> Self {
        Self {
            shading: Shading::Basic,
            color,
            opacity: 1.0,
            transparent: false,
            wireframe: false,
            side: Side::Front,
            map: None,
        }
    }

    pub fn standard(color: Color) -> Self {
        Self {
            shading: Shading::Standard,
            ..Self::basic(color)
        }
    }

    pub fn textured(map: TextureId) -> Self {
        Self {
            map: Some(map),
            ..Self::basic(Color::WHITE)
        }
    }

    pub fn shader(source: Arc<ShaderSource>) -> Self {
        Self {
            shading: Shading::Shader(source),
            ..Self::basic(Color::WHITE)
        }
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn with_wireframe(mut self, wireframe: bool) -> Self {
        self.wireframe = wireframe;
        self
    }

    pub fn is_lit(&self) -> bool {
        matches!(self.shading, Shading::Standard)
    }

    /// Blended materials are drawn after opaque ones without depth writes.
    pub fn is_blended(&self) -> bool {
        self.transparent && self.opacity < 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_panel_colour() {
        let colour = Color::parse("#ffea00").unwrap();
        assert_eq!(colour.to_hex(), 0xffea00);
        assert!(Color::parse("#ffea0").is_err());
        assert!(Color::parse("zzzzzz").is_err());
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(Color::from_hsv(0.0, 1.0, 1.0).to_hex(), 0xff0000);
        assert_eq!(Color::from_hsv(1.0 / 3.0, 1.0, 1.0).to_hex(), 0x00ff00);
        assert_eq!(Color::from_hsv(2.0 / 3.0, 1.0, 1.0).to_hex(), 0x0000ff);
        let yellow = Color::from_hex(0xffea00);
        let roundtrip = Color::from_hsv(yellow.hue(), 1.0, 1.0);
        assert_eq!(roundtrip.to_hex(), 0xffea00);
    }

    #[test]
    fn linear_conversion_keeps_extremes() {
        assert_eq!(Color::RED.to_linear(), [1.0, 0.0, 0.0]);
        let grey = Color::from_hex(0x333333).to_linear();
        assert!(grey[0] > 0.03 && grey[0] < 0.04);
    }
}
