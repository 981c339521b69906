/// Data carried between pipeline stages
///
/// World triangles enter, clip-space primitives flow through the clipper,
/// screen triangles reach the rasterizer and fragments reach the depth test.
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// 8-bit RGB color
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels as floats in 0..=255, the space attributes are interpolated in.
    #[inline]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.r as f32, self.g as f32, self.b as f32)
    }

    /// Round and saturate float channels back to 8 bits.
    #[inline]
    pub fn from_vec3(c: Vec3) -> Self {
        let c = c.round().clamp(Vec3::ZERO, Vec3::splat(255.0));
        Self::new(c.x as u8, c.y as u8, c.z as u8)
    }

    /// Packed 0xAARRGGBB with opaque alpha (framebuffer / softbuffer layout)
    #[inline]
    pub const fn to_argb(self) -> u32 {
        0xFF000000 | ((self.r as u32) << 16) | ((self.g as u32) << 8) | (self.b as u32)
    }

    #[inline]
    pub const fn from_argb(argb: u32) -> Self {
        Self::new((argb >> 16) as u8, (argb >> 8) as u8, argb as u8)
    }
}

/// World-space input triangle: three positions and three colors.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Triangle {
    pub positions: [Vec3; 3],
    pub colors: [Color; 3],
}

impl Triangle {
    pub fn new(positions: [Vec3; 3], colors: [Color; 3]) -> Self {
        Self { positions, colors }
    }

    pub fn uniform(positions: [Vec3; 3], color: Color) -> Self {
        Self::new(positions, [color; 3])
    }
}

/// Clip-space vertex with its interpolatable color.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vertex {
    /// Homogeneous clip-space position (x, y, z, w)
    pub clip: Vec4,
    /// RGB in 0..=255, kept as floats so clipping never quantizes
    pub color: Vec3,
}

impl Vertex {
    #[inline]
    pub fn new(clip: Vec4, color: Vec3) -> Self {
        Self { clip, color }
    }

    /// New vertex at parameter `t` along the edge self -> other.
    #[inline]
    pub fn lerp(&self, other: &Vertex, t: f32) -> Vertex {
        Vertex {
            clip: self.clip + (other.clip - self.clip) * t,
            color: self.color + (other.color - self.color) * t,
        }
    }
}

/// Ordered vertex triple; winding determines the facing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Primitive {
    pub vertices: [Vertex; 3],
}

impl Primitive {
    #[inline]
    pub fn new(v0: Vertex, v1: Vertex, v2: Vertex) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }
}

/// Post-divide, viewport-mapped triangle with the per-vertex terms
/// needed for perspective-correct interpolation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScreenTriangle {
    /// Screen position (x, y) and NDC depth (z)
    pub positions: [Vec3; 3],
    /// 1 / clip w, strictly positive
    pub inv_w: [f32; 3],
    /// Color premultiplied by `inv_w`
    pub color_over_w: [Vec3; 3],
}

/// Interpolated sample for one covered pixel.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Fragment {
    pub depth: f32,
    pub color: Vec3,
}

/// Per-frame counters returned by every render call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub triangles_submitted: usize,
    pub triangles_near_rejected: usize,
    pub triangles_backface_culled: usize,
    pub primitives_clipped_away: usize,
    pub primitives_rasterized: usize,
    pub bin_entries: usize,
    pub fragments_written: usize,
}

impl FrameStats {
    /// Fold the counts of a later stage into this frame's totals.
    pub fn merge(&mut self, other: &FrameStats) {
        self.triangles_submitted += other.triangles_submitted;
        self.triangles_near_rejected += other.triangles_near_rejected;
        self.triangles_backface_culled += other.triangles_backface_culled;
        self.primitives_clipped_away += other.primitives_clipped_away;
        self.primitives_rasterized += other.primitives_rasterized;
        self.bin_entries += other.bin_entries;
        self.fragments_written += other.fragments_written;
    }
}
