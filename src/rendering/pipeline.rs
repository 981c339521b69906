/// Frame pipeline: vertex stage -> clipper -> backend
///
/// Camera, viewport and config are explicit inputs to every call; the
/// pipeline keeps only scratch buffers between frames.
use super::backend::{RasterBackend, SerialBackend};
use super::clipper::clip_primitive;
use super::framebuffer::Framebuffer;
use super::tiled::TiledBackend;
use super::types::{FrameStats, Primitive, Triangle};
use super::vertex_stage::{VertexStage, VertexStageSettings};
use crate::config::{BackendKind, RenderConfig};
use crate::error::Result;
use crate::perf_scope;
use glam::Mat4;

pub struct Pipeline {
    config: RenderConfig,
    projected: Vec<Primitive>,
    clipped: Vec<Primitive>,
}

impl Pipeline {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            projected: Vec::new(),
            clipped: Vec::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// New target size. Backends created afterwards are sized for it.
    pub fn set_viewport(&mut self, width: usize, height: usize) {
        self.config.width = width;
        self.config.height = height;
    }

    /// Backend selected by `config.backend`.
    pub fn create_backend(&self) -> Result<Box<dyn RasterBackend>> {
        Ok(match self.config.backend {
            BackendKind::Serial => Box::new(SerialBackend::from_config(&self.config)),
            BackendKind::Tiled => Box::new(TiledBackend::from_config(&self.config)?),
        })
    }

    /// Vertex and clip stages only. `out` receives clip-space primitives
    /// that lie inside the view volume, ready for any backend.
    pub fn prepare_primitives_into(
        &mut self,
        scene: &[Triangle],
        view: &Mat4,
        projection: &Mat4,
        out: &mut Vec<Primitive>,
    ) -> FrameStats {
        perf_scope!("prepare_primitives");
        out.clear();
        self.projected.clear();

        let stage = VertexStage::new(view, projection, VertexStageSettings::from(&self.config));
        let mut stats = stage.run(scene, &mut self.projected);

        for prim in &self.projected {
            if clip_primitive(prim, out) == 0 {
                stats.primitives_clipped_away += 1;
            }
        }
        stats
    }

    pub fn prepare_primitives(
        &mut self,
        scene: &[Triangle],
        view: &Mat4,
        projection: &Mat4,
    ) -> (Vec<Primitive>, FrameStats) {
        let mut out = Vec::with_capacity(scene.len());
        let stats = self.prepare_primitives_into(scene, view, projection, &mut out);
        (out, stats)
    }

    /// Render one frame. Blocks until `framebuffer` holds the finished
    /// image; on error the frame is discarded.
    pub fn render(
        &mut self,
        scene: &[Triangle],
        view: &Mat4,
        projection: &Mat4,
        framebuffer: &mut Framebuffer,
        backend: &mut dyn RasterBackend,
    ) -> Result<FrameStats> {
        perf_scope!("frame");
        let mut clipped = std::mem::take(&mut self.clipped);
        let mut stats = self.prepare_primitives_into(scene, view, projection, &mut clipped);

        let result = backend.render(&clipped, framebuffer);
        self.clipped = clipped;
        stats.merge(&result?);

        log::debug!(
            "{} frame: {} submitted, {} near-rejected, {} back-face, {} clipped away, {} rasterized, {} bin entries, {} fragments",
            backend.name(),
            stats.triangles_submitted,
            stats.triangles_near_rejected,
            stats.triangles_backface_culled,
            stats.primitives_clipped_away,
            stats.primitives_rasterized,
            stats.bin_entries,
            stats.fragments_written
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::types::Color;
    use glam::Vec3;

    fn config(backend: BackendKind) -> RenderConfig {
        RenderConfig {
            width: 64,
            height: 48,
            tile_size: 16,
            max_triangles: 32,
            clear_color: Color::BLACK,
            backend,
            ..RenderConfig::default()
        }
    }

    fn camera(config: &RenderConfig) -> (Mat4, Mat4) {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh_gl(
            config.fov_y_degrees.to_radians(),
            config.aspect_ratio(),
            config.near,
            config.far,
        );
        (view, proj)
    }

    #[test]
    fn prepare_reports_each_rejection_stage() {
        let cfg = config(BackendKind::Serial);
        let (view, proj) = camera(&cfg);
        let scene = [
            // Visible
            Triangle::uniform(
                [Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
                Color::RED,
            ),
            // Behind the camera
            Triangle::uniform(
                [Vec3::new(-1.0, -1.0, 5.0), Vec3::new(1.0, -1.0, 5.0), Vec3::new(0.0, 1.0, 5.0)],
                Color::RED,
            ),
            // In front but far off to the side
            Triangle::uniform(
                [Vec3::new(50.0, 0.0, 0.0), Vec3::new(52.0, 0.0, 0.0), Vec3::new(51.0, 1.0, 0.0)],
                Color::RED,
            ),
        ];
        let mut pipeline = Pipeline::new(cfg);
        let (prims, stats) = pipeline.prepare_primitives(&scene, &view, &proj);
        assert_eq!(prims.len(), 1);
        assert_eq!(stats.triangles_submitted, 3);
        assert_eq!(stats.triangles_near_rejected, 1);
        assert_eq!(stats.primitives_clipped_away, 1);
    }

    #[test]
    fn configured_backends_render_identical_frames() {
        let scene = [
            Triangle::new(
                [Vec3::new(-1.5, -1.0, 0.0), Vec3::new(1.5, -1.0, -1.0), Vec3::new(0.0, 1.5, 0.5)],
                [Color::RED, Color::GREEN, Color::BLUE],
            ),
            Triangle::uniform(
                [Vec3::new(-1.0, 0.0, 0.2), Vec3::new(1.0, 0.5, -0.3), Vec3::new(0.0, -1.2, 0.1)],
                Color::WHITE,
            ),
        ];

        let mut frames = Vec::new();
        for kind in [BackendKind::Serial, BackendKind::Tiled] {
            let cfg = config(kind);
            let (view, proj) = camera(&cfg);
            let mut pipeline = Pipeline::new(cfg);
            let mut backend = pipeline.create_backend().unwrap();
            let mut fb = Framebuffer::new(64, 48);
            let stats = pipeline
                .render(&scene, &view, &proj, &mut fb, backend.as_mut())
                .unwrap();
            assert_eq!(stats.primitives_rasterized, 2);
            frames.push(fb.color_buffer);
        }
        assert_eq!(frames[0], frames[1]);
        assert!(frames[0].iter().any(|&c| c != Color::BLACK.to_argb()));
    }
}
