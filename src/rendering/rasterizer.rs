/// Rasterizer core
///
/// Converts a clip-space primitive into a screen triangle, then enumerates
/// covered pixel centers with edge functions. Depth is interpolated affinely
/// in screen space, color perspective-correctly through 1/w.
///
/// Every pixel is evaluated directly from the triangle setup (no incremental
/// stepping), so the serial path and the per-pixel tiled path produce
/// bit-identical fragments.
use super::framebuffer::{FrameSlice, Framebuffer};
use super::types::{Fragment, Primitive, ScreenTriangle};
use crate::count_call;
use crate::perf::FUNCTION_COUNTERS;
use glam::{Vec2, Vec3};

/// Vertices with clip w at or below this are rejected before the divide.
pub const MIN_CLIP_W: f32 = 1e-6;

/// Triangles whose doubled screen area is below this are degenerate.
pub const MIN_SCREEN_AREA: f32 = 1e-6;

/// Abstraction over any depth-tested color target (full framebuffer, stripe).
pub trait PixelTarget {
    /// Full framebuffer width (stride for indexing).
    fn width(&self) -> usize;
    /// Full framebuffer height (used for NDC -> screen mapping).
    fn full_height(&self) -> usize;
    /// Rectangle covered by this target in framebuffer coordinates:
    /// (x0, y0, width, height).
    fn rect(&self) -> (usize, usize, usize, usize);
    /// Depth-tested write at global pixel (x, y).
    fn write_fragment(&mut self, x: usize, y: usize, fragment: &Fragment) -> bool;
}

impl<'a> PixelTarget for FrameSlice<'a> {
    #[inline]
    fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn full_height(&self) -> usize {
        self.full_height
    }

    #[inline]
    fn rect(&self) -> (usize, usize, usize, usize) {
        (0, self.y0, self.width, self.height)
    }

    #[inline]
    fn write_fragment(&mut self, x: usize, y: usize, fragment: &Fragment) -> bool {
        FrameSlice::write_fragment(self, x, y, fragment)
    }
}

impl PixelTarget for Framebuffer {
    #[inline]
    fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn full_height(&self) -> usize {
        self.height
    }

    #[inline]
    fn rect(&self) -> (usize, usize, usize, usize) {
        (0, 0, self.width, self.height)
    }

    #[inline]
    fn write_fragment(&mut self, x: usize, y: usize, fragment: &Fragment) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        Framebuffer::write_fragment(self, x, y, fragment)
    }
}

/// NDC to screen: x right, y down (flipped), z passed through as depth.
#[inline]
pub fn ndc_to_screen(ndc: Vec3, width: f32, height: f32) -> Vec3 {
    Vec3::new(
        (ndc.x * 0.5 + 0.5) * width,
        (1.0 - (ndc.y * 0.5 + 0.5)) * height,
        ndc.z,
    )
}

/// Edge function for barycentric coordinates
/// Returns 2x the signed area of the triangle
#[inline]
pub fn edge_function(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (c.x - a.x) * (b.y - a.y) - (c.y - a.y) * (b.x - a.x)
}

impl ScreenTriangle {
    /// Perspective divide and viewport mapping.
    /// Returns None if any vertex has w <= MIN_CLIP_W.
    pub fn from_primitive(prim: &Primitive, width: usize, height: usize) -> Option<Self> {
        let (fw, fh) = (width as f32, height as f32);
        let mut positions = [Vec3::ZERO; 3];
        let mut inv_w = [0.0f32; 3];
        let mut color_over_w = [Vec3::ZERO; 3];

        for (i, v) in prim.vertices.iter().enumerate() {
            let w = v.clip.w;
            if !(w > MIN_CLIP_W) {
                return None;
            }
            let iw = 1.0 / w;
            let ndc = v.clip.truncate() * iw;
            positions[i] = ndc_to_screen(ndc, fw, fh);
            inv_w[i] = iw;
            color_over_w[i] = v.color * iw;
        }

        Some(Self {
            positions,
            inv_w,
            color_over_w,
        })
    }

    #[inline]
    pub fn screen_xy(&self) -> [Vec2; 3] {
        [
            self.positions[0].truncate(),
            self.positions[1].truncate(),
            self.positions[2].truncate(),
        ]
    }
}

/// Inclusive pixel rectangle, already clamped to the framebuffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl BoundingBox {
    /// floor(min) .. ceil(max) of the screen vertices, clamped to
    /// [0, width-1] x [0, height-1]. None when empty after clamping.
    pub fn of(tri: &ScreenTriangle, width: usize, height: usize) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let [p0, p1, p2] = tri.screen_xy();
        let min = p0.min(p1).min(p2).floor();
        let max = p0.max(p1).max(p2).ceil();
        if !(min.is_finite() && max.is_finite()) {
            return None;
        }

        let min_x = (min.x as i64).max(0);
        let min_y = (min.y as i64).max(0);
        let max_x = (max.x as i64).min(width as i64 - 1);
        let max_y = (max.y as i64).min(height as i64 - 1);
        if min_x > max_x || min_y > max_y {
            return None;
        }

        Some(Self {
            min_x: min_x as usize,
            min_y: min_y as usize,
            max_x: max_x as usize,
            max_y: max_y as usize,
        })
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Intersect with a target rectangle given as (x0, y0, width, height).
    pub fn intersect_rect(&self, rect: (usize, usize, usize, usize)) -> Option<Self> {
        let (x0, y0, w, h) = rect;
        if w == 0 || h == 0 {
            return None;
        }
        let min_x = self.min_x.max(x0);
        let min_y = self.min_y.max(y0);
        let max_x = self.max_x.min(x0 + w - 1);
        let max_y = self.max_y.min(y0 + h - 1);
        if min_x > max_x || min_y > max_y {
            return None;
        }
        Some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }
}

/// Normalized barycentric weights; they sum to 1.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Barycentric {
    pub l0: f32,
    pub l1: f32,
    pub l2: f32,
}

impl Barycentric {
    /// Inside (or on an edge) when every weight is non-negative.
    /// Sign-normalized by the area, so both windings pass.
    #[inline]
    pub fn is_inside(&self) -> bool {
        self.l0 >= 0.0 && self.l1 >= 0.0 && self.l2 >= 0.0
    }
}

/// Per-triangle constants for coverage and interpolation.
#[derive(Copy, Clone, Debug)]
pub struct TriangleSetup {
    pub tri: ScreenTriangle,
    xy: [Vec2; 3],
    inv_area: f32,
}

impl TriangleSetup {
    /// None for degenerate (near-zero area or non-finite) triangles.
    pub fn new(tri: &ScreenTriangle) -> Option<Self> {
        let xy = tri.screen_xy();
        let area = edge_function(xy[0], xy[1], xy[2]);
        if !area.is_finite() || area.abs() < MIN_SCREEN_AREA {
            count_call!(FUNCTION_COUNTERS.degenerate_triangles);
            return None;
        }
        Some(Self {
            tri: *tri,
            xy,
            inv_area: 1.0 / area,
        })
    }

    #[inline]
    pub fn barycentric(&self, p: Vec2) -> Barycentric {
        let [a, b, c] = self.xy;
        Barycentric {
            l0: edge_function(b, c, p) * self.inv_area,
            l1: edge_function(c, a, p) * self.inv_area,
            l2: edge_function(a, b, p) * self.inv_area,
        }
    }

    /// Affine depth and perspective-correct color at the given weights.
    #[inline]
    pub fn interpolate(&self, bary: &Barycentric) -> Fragment {
        let t = &self.tri;
        let depth =
            bary.l0 * t.positions[0].z + bary.l1 * t.positions[1].z + bary.l2 * t.positions[2].z;
        let inv_w = bary.l0 * t.inv_w[0] + bary.l1 * t.inv_w[1] + bary.l2 * t.inv_w[2];
        let color_over_w = t.color_over_w[0] * bary.l0
            + t.color_over_w[1] * bary.l1
            + t.color_over_w[2] * bary.l2;
        Fragment {
            depth,
            color: color_over_w / inv_w,
        }
    }

    /// Fragment for pixel (x, y) sampled at its center, if covered.
    #[inline]
    pub fn sample(&self, x: usize, y: usize) -> Option<Fragment> {
        let bary = self.barycentric(Vec2::new(x as f32 + 0.5, y as f32 + 0.5));
        bary.is_inside().then(|| self.interpolate(&bary))
    }
}

/// Visit every covered pixel center of `tri` inside `rect`
/// ((x0, y0, width, height) within a `width` x `height` framebuffer).
pub fn for_each_fragment<F>(
    tri: &ScreenTriangle,
    width: usize,
    height: usize,
    rect: (usize, usize, usize, usize),
    mut visit: F,
) where
    F: FnMut(usize, usize, Fragment),
{
    let Some(bbox) = BoundingBox::of(tri, width, height).and_then(|b| b.intersect_rect(rect))
    else {
        return;
    };
    let Some(setup) = TriangleSetup::new(tri) else {
        return;
    };

    for y in bbox.min_y..=bbox.max_y {
        for x in bbox.min_x..=bbox.max_x {
            if let Some(fragment) = setup.sample(x, y) {
                visit(x, y, fragment);
            }
        }
    }
}

/// Rasterize one screen triangle into `target`, depth testing every
/// fragment. Returns the number of fragments that passed.
pub fn rasterize_triangle<T: PixelTarget + ?Sized>(tri: &ScreenTriangle, target: &mut T) -> usize {
    count_call!(FUNCTION_COUNTERS.rasterize_triangle_calls);
    let (width, height, rect) = (target.width(), target.full_height(), target.rect());
    let mut written = 0usize;
    for_each_fragment(tri, width, height, rect, |x, y, fragment| {
        if target.write_fragment(x, y, &fragment) {
            written += 1;
        }
    });
    written
}
