/// Homogeneous clip-space polygon clipping
///
/// Sutherland-Hodgman against the six canonical planes (OpenGL depth range,
/// -w <= x, y, z <= w), followed by fan re-triangulation. Runs before the
/// perspective divide so no plane depends on the projection parameters.
use super::types::{Primitive, Vertex};
use crate::perf::FUNCTION_COUNTERS;
use crate::{count_add, count_call};
use glam::{Vec3, Vec4};

/// Points within this distance outside a plane still count as inside,
/// which keeps shared edges on a plane from cracking.
pub const CLIP_EPSILON: f32 = 1e-3;

// A triangle gains at most one vertex per plane (3 + 6). Headroom for
// numerically non-convex inputs.
pub const MAX_POLY_VERTS: usize = 16;

const EMPTY_VERTEX: Vertex = Vertex {
    clip: Vec4::ZERO,
    color: Vec3::ZERO,
};

/// One of the six clip-volume boundaries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClipPlane {
    /// x >= -w
    Left,
    /// x <= w
    Right,
    /// y >= -w
    Bottom,
    /// y <= w
    Top,
    /// z >= -w
    Near,
    /// z <= w
    Far,
}

impl ClipPlane {
    /// Clipping order
    pub const ALL: [ClipPlane; 6] = [
        ClipPlane::Left,
        ClipPlane::Right,
        ClipPlane::Bottom,
        ClipPlane::Top,
        ClipPlane::Near,
        ClipPlane::Far,
    ];

    /// Signed distance, positive inside the clip volume.
    #[inline]
    pub fn distance(self, p: Vec4) -> f32 {
        match self {
            ClipPlane::Left => p.w + p.x,
            ClipPlane::Right => p.w - p.x,
            ClipPlane::Bottom => p.w + p.y,
            ClipPlane::Top => p.w - p.y,
            ClipPlane::Near => p.w + p.z,
            ClipPlane::Far => p.w - p.z,
        }
    }
}

/// Convex polygon of clip-space vertices with fixed inline storage.
#[derive(Copy, Clone, Debug)]
pub struct Polygon {
    vertices: [Vertex; MAX_POLY_VERTS],
    len: usize,
}

impl Default for Polygon {
    fn default() -> Self {
        Self {
            vertices: [EMPTY_VERTEX; MAX_POLY_VERTS],
            len: 0,
        }
    }
}

impl Polygon {
    pub fn from_primitive(prim: &Primitive) -> Self {
        Self::from_slice(&prim.vertices)
    }

    pub fn from_slice(vertices: &[Vertex]) -> Self {
        let mut poly = Self::default();
        for v in vertices {
            poly.push(*v);
        }
        poly
    }

    #[inline]
    pub fn push(&mut self, v: Vertex) {
        debug_assert!(self.len < MAX_POLY_VERTS, "clip polygon overflow");
        if self.len < MAX_POLY_VERTS {
            self.vertices[self.len] = v;
            self.len += 1;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[Vertex] {
        &self.vertices[..self.len]
    }

    /// Fan rooted at vertex 0: (v0, vi, vi+1) for i in 1..n-1.
    /// Yields nothing for fewer than three vertices.
    pub fn triangulate_fan(&self) -> impl Iterator<Item = Primitive> + '_ {
        let verts = self.as_slice();
        (1..verts.len().saturating_sub(1))
            .map(move |i| Primitive::new(verts[0], verts[i], verts[i + 1]))
    }
}

/// Point on edge a -> b where the signed distance crosses zero.
/// `t` is clamped to [0, 1]; an edge with equal distances returns `a`.
#[inline]
pub fn intersect_edge(a: &Vertex, b: &Vertex, da: f32, db: f32) -> Vertex {
    if da == db {
        return *a;
    }
    let t = (da / (da - db)).clamp(0.0, 1.0);
    a.lerp(b, t)
}

/// Clip a convex polygon against one half-space given by `distance`
/// (positive = inside). Walks each directed edge prev -> curr, wrapping
/// last -> first.
pub fn clip_polygon_with<F>(input: &Polygon, distance: F) -> Polygon
where
    F: Fn(Vec4) -> f32,
{
    let mut output = Polygon::default();
    let verts = input.as_slice();
    let Some(last) = verts.last() else {
        return output;
    };

    let mut prev = *last;
    let mut prev_d = distance(prev.clip);
    let mut prev_inside = prev_d >= -CLIP_EPSILON;

    for &curr in verts {
        let curr_d = distance(curr.clip);
        let curr_inside = curr_d >= -CLIP_EPSILON;

        match (prev_inside, curr_inside) {
            (true, true) => output.push(curr),
            (true, false) => output.push(intersect_edge(&prev, &curr, prev_d, curr_d)),
            (false, true) => {
                output.push(intersect_edge(&prev, &curr, prev_d, curr_d));
                output.push(curr);
            }
            (false, false) => {}
        }

        prev = curr;
        prev_d = curr_d;
        prev_inside = curr_inside;
    }

    output
}

#[inline]
pub fn clip_polygon(input: &Polygon, plane: ClipPlane) -> Polygon {
    clip_polygon_with(input, |p| plane.distance(p))
}

/// Clip a polygon against all six planes in order.
/// Stops early once fewer than three vertices remain.
pub fn clip_against_frustum(polygon: Polygon) -> Polygon {
    let mut poly = polygon;
    for plane in ClipPlane::ALL {
        poly = clip_polygon(&poly, plane);
        if poly.len() < 3 {
            return Polygon::default();
        }
    }
    poly
}

/// Clip one primitive and append the fan triangles to `out`.
/// Returns how many primitives were appended (0 when fully culled).
pub fn clip_primitive(prim: &Primitive, out: &mut Vec<Primitive>) -> usize {
    let clipped = clip_against_frustum(Polygon::from_primitive(prim));
    let before = out.len();
    out.extend(clipped.triangulate_fan());
    let emitted = out.len() - before;
    if emitted == 0 {
        count_call!(FUNCTION_COUNTERS.primitives_clipped_away);
    }
    count_add!(FUNCTION_COUNTERS.clip_output_triangles, emitted);
    emitted
}

/// Clip stage over a whole batch. Returns the surviving primitives and
/// the number of inputs that were culled entirely.
pub fn clip_stage(prims: &[Primitive]) -> (Vec<Primitive>, usize) {
    let mut out = Vec::with_capacity(prims.len());
    let mut culled = 0usize;
    for prim in prims {
        if clip_primitive(prim, &mut out) == 0 {
            culled += 1;
        }
    }
    log::trace!(
        "clip stage: {} in, {} out, {} culled",
        prims.len(),
        out.len(),
        culled
    );
    (out, culled)
}
