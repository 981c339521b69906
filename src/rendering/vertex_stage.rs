/// Vertex/projection stage
///
/// World triangles are moved into camera space (for the back-face test) and
/// then into clip space with the projection. The near-plane reject runs on
/// the clip-space result, so it always agrees with the projection the caller
/// passed in. Nothing is divided by w here.
use super::clipper::{ClipPlane, CLIP_EPSILON};
use super::types::{FrameStats, Primitive, Triangle, Vertex};
use crate::config::RenderConfig;
use crate::count_call;
use crate::perf::FUNCTION_COUNTERS;
use glam::{Mat4, Vec3, Vec4};

/// Early rejection parameters.
#[derive(Debug, Clone, Copy)]
pub struct VertexStageSettings {
    /// Clip-space tolerance on the outside of the near plane. Never tighter
    /// than the clipper's own inside test.
    pub near_epsilon: f32,
    pub backface_culling: bool,
}

impl Default for VertexStageSettings {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

impl From<&RenderConfig> for VertexStageSettings {
    fn from(config: &RenderConfig) -> Self {
        Self {
            near_epsilon: config.near_epsilon,
            backface_culling: config.backface_culling,
        }
    }
}

/// What happened to a single input triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VertexOutcome {
    Emitted(Primitive),
    NearRejected,
    BackfaceCulled,
}

pub struct VertexStage {
    view: Mat4,
    projection: Mat4,
    settings: VertexStageSettings,
}

impl VertexStage {
    pub fn new(view: &Mat4, projection: &Mat4, settings: VertexStageSettings) -> Self {
        Self {
            view: *view,
            projection: *projection,
            settings,
        }
    }

    /// True when every vertex lies outside the near plane (z < -w) by more
    /// than the tolerance. Such a triangle would be culled by the clipper too.
    #[inline]
    pub fn is_behind_near_plane(&self, clip: &[Vec4; 3]) -> bool {
        let tolerance = self.settings.near_epsilon.max(CLIP_EPSILON);
        clip.iter()
            .all(|&p| ClipPlane::Near.distance(p) < -tolerance)
    }

    /// Counter-clockwise (as seen by the viewer) triangles face the camera.
    #[inline]
    pub fn is_back_facing(camera: &[Vec3; 3]) -> bool {
        let normal = (camera[1] - camera[0]).cross(camera[2] - camera[0]);
        normal.dot(-camera[0]) <= 0.0
    }

    pub fn process(&self, tri: &Triangle) -> VertexOutcome {
        let camera = tri.positions.map(|p| self.view.transform_point3(p));
        let clip = camera.map(|p| self.projection * p.extend(1.0));

        if self.is_behind_near_plane(&clip) {
            return VertexOutcome::NearRejected;
        }
        if self.settings.backface_culling && Self::is_back_facing(&camera) {
            return VertexOutcome::BackfaceCulled;
        }

        let vertex = |i: usize| Vertex::new(clip[i], tri.colors[i].to_vec3());
        VertexOutcome::Emitted(Primitive::new(vertex(0), vertex(1), vertex(2)))
    }

    /// Transform a batch, appending surviving primitives to `out`.
    /// Output keeps input order.
    pub fn run(&self, triangles: &[Triangle], out: &mut Vec<Primitive>) -> FrameStats {
        let mut stats = FrameStats {
            triangles_submitted: triangles.len(),
            ..FrameStats::default()
        };
        out.reserve(triangles.len());

        for tri in triangles {
            count_call!(FUNCTION_COUNTERS.triangles_submitted);
            match self.process(tri) {
                VertexOutcome::Emitted(prim) => out.push(prim),
                VertexOutcome::NearRejected => {
                    count_call!(FUNCTION_COUNTERS.triangles_near_rejected);
                    stats.triangles_near_rejected += 1;
                }
                VertexOutcome::BackfaceCulled => {
                    count_call!(FUNCTION_COUNTERS.triangles_backface_culled);
                    stats.triangles_backface_culled += 1;
                }
            }
        }

        log::trace!(
            "vertex stage: {} in, {} out ({} near, {} back-face)",
            triangles.len(),
            out.len(),
            stats.triangles_near_rejected,
            stats.triangles_backface_culled
        );
        stats
    }
}

/// Convenience wrapper over [`VertexStage::run`].
pub fn vertex_stage(
    triangles: &[Triangle],
    view: &Mat4,
    projection: &Mat4,
    settings: VertexStageSettings,
) -> (Vec<Primitive>, FrameStats) {
    let mut out = Vec::with_capacity(triangles.len());
    let stats = VertexStage::new(view, projection, settings).run(triangles, &mut out);
    (out, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::types::Color;

    fn projection() -> Mat4 {
        Mat4::perspective_rh_gl(70f32.to_radians(), 1.0, 0.1, 100.0)
    }

    fn tri_at_z(z: [f32; 3]) -> Triangle {
        Triangle::uniform(
            [
                Vec3::new(-1.0, -1.0, z[0]),
                Vec3::new(1.0, -1.0, z[1]),
                Vec3::new(0.0, 1.0, z[2]),
            ],
            Color::RED,
        )
    }

    #[test]
    fn triangle_in_front_is_projected_to_clip_space() {
        let proj = projection();
        let (prims, stats) = vertex_stage(
            &[tri_at_z([-5.0; 3])],
            &Mat4::IDENTITY,
            &proj,
            VertexStageSettings::default(),
        );
        assert_eq!(prims.len(), 1);
        assert_eq!(stats.triangles_submitted, 1);
        let v0 = prims[0].vertices[0];
        assert_eq!(v0.clip, proj * Vec3::new(-1.0, -1.0, -5.0).extend(1.0));
        // GL projection: w equals camera-space distance
        assert!((v0.clip.w - 5.0).abs() < 1e-5);
        assert_eq!(v0.color, Color::RED.to_vec3());
    }

    #[test]
    fn triangle_behind_camera_is_rejected() {
        let (prims, stats) = vertex_stage(
            &[tri_at_z([2.0, 3.0, 1.0])],
            &Mat4::IDENTITY,
            &projection(),
            VertexStageSettings::default(),
        );
        assert!(prims.is_empty());
        assert_eq!(stats.triangles_near_rejected, 1);
    }

    #[test]
    fn triangle_straddling_near_plane_is_kept_for_clipping() {
        let (prims, stats) = vertex_stage(
            &[tri_at_z([-5.0, 1.0, 1.0])],
            &Mat4::IDENTITY,
            &projection(),
            VertexStageSettings::default(),
        );
        assert_eq!(prims.len(), 1);
        assert_eq!(stats.triangles_near_rejected, 0);
    }

    #[test]
    fn vertex_on_near_plane_is_within_tolerance() {
        let proj = projection();
        let stage = VertexStage::new(&Mat4::IDENTITY, &proj, VertexStageSettings::default());
        let at = |z: f32| [proj * Vec4::new(0.0, 0.0, z, 1.0); 3];
        // Exactly on z = -near: kept.
        assert!(!stage.is_behind_near_plane(&at(-0.1)));
        assert!(stage.is_behind_near_plane(&at(-0.05)));
    }

    #[test]
    fn near_reject_follows_the_projection_not_the_config() {
        // Config says near = 0.1, the caller's projection uses 0.01.
        let settings = VertexStageSettings::from(&RenderConfig::default());
        let proj = Mat4::perspective_rh_gl(1.2, 1.0, 0.01, 100.0);
        let tri = Triangle::uniform(
            [
                Vec3::new(-0.01, -0.01, -0.05),
                Vec3::new(0.01, -0.01, -0.05),
                Vec3::new(0.0, 0.01, -0.05),
            ],
            Color::GREEN,
        );
        let (prims, stats) = vertex_stage(&[tri], &Mat4::IDENTITY, &proj, settings);
        assert_eq!(stats.triangles_near_rejected, 0);
        assert_eq!(prims.len(), 1);

        let mut clipped = Vec::new();
        assert_eq!(crate::rendering::clipper::clip_primitive(&prims[0], &mut clipped), 1);
    }

    #[test]
    fn backface_culling_is_optional() {
        // Clockwise as seen from the origin looking down -z
        let back = Triangle::uniform(
            [
                Vec3::new(-1.0, -1.0, -5.0),
                Vec3::new(0.0, 1.0, -5.0),
                Vec3::new(1.0, -1.0, -5.0),
            ],
            Color::BLUE,
        );
        let front = tri_at_z([-5.0; 3]);

        let off = VertexStageSettings::default();
        let (prims, _) = vertex_stage(&[back, front], &Mat4::IDENTITY, &projection(), off);
        assert_eq!(prims.len(), 2);

        let on = VertexStageSettings {
            backface_culling: true,
            ..off
        };
        let (prims, stats) = vertex_stage(&[back, front], &Mat4::IDENTITY, &projection(), on);
        assert_eq!(prims.len(), 1);
        assert_eq!(stats.triangles_backface_culled, 1);
        assert_eq!(prims[0].vertices[0].color, Color::RED.to_vec3());
    }
}
