/// Rasterization backends
///
/// A backend takes clipped clip-space primitives and produces a finished
/// frame in the caller's framebuffer. All backends clear to their clear
/// color first and must produce identical pixels for the same input.
use super::framebuffer::Framebuffer;
use super::rasterizer::rasterize_triangle;
use super::types::{Color, FrameStats, Primitive, ScreenTriangle};
use crate::config::RenderConfig;
use crate::error::Result;
use crate::perf_scope;

pub trait RasterBackend {
    fn name(&self) -> &'static str;

    /// Clear `framebuffer`, then rasterize `primitives` in order.
    /// Blocks until the frame is complete.
    fn render(&mut self, primitives: &[Primitive], framebuffer: &mut Framebuffer)
        -> Result<FrameStats>;
}

/// Single-threaded path: triangles one at a time, each with exclusive
/// access to the framebuffer for its bounding-box scan.
#[derive(Debug, Clone)]
pub struct SerialBackend {
    clear_color: Color,
}

impl SerialBackend {
    pub fn new(clear_color: Color) -> Self {
        Self { clear_color }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.clear_color)
    }
}

impl Default for SerialBackend {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

impl RasterBackend for SerialBackend {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn render(
        &mut self,
        primitives: &[Primitive],
        framebuffer: &mut Framebuffer,
    ) -> Result<FrameStats> {
        perf_scope!("serial_render");
        framebuffer.clear(self.clear_color);

        let (width, height) = framebuffer.dimensions();
        let mut stats = FrameStats::default();
        for prim in primitives {
            let Some(tri) = ScreenTriangle::from_primitive(prim, width, height) else {
                continue;
            };
            stats.primitives_rasterized += 1;
            stats.fragments_written += rasterize_triangle(&tri, framebuffer);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::types::Vertex;
    use glam::Vec4;

    fn ndc_tri(p: [(f32, f32); 3], z: f32, color: Color) -> Primitive {
        let v = |(x, y): (f32, f32)| Vertex::new(Vec4::new(x, y, z, 1.0), color.to_vec3());
        Primitive::new(v(p[0]), v(p[1]), v(p[2]))
    }

    #[test]
    fn serial_backend_clears_before_drawing() {
        let mut fb = Framebuffer::new(8, 8);
        fb.set_pixel(0, 0, Color::RED, 0.0);
        let mut backend = SerialBackend::new(Color::new(9, 9, 9));
        let stats = backend.render(&[], &mut fb).unwrap();
        assert_eq!(stats, FrameStats::default());
        assert_eq!(fb.color_at(0, 0), Color::new(9, 9, 9));
        assert_eq!(fb.depth_at(0, 0), f32::INFINITY);
    }

    #[test]
    fn nearer_triangle_wins_in_either_order() {
        let near = ndc_tri([(-1.0, -1.0), (1.0, -1.0), (0.0, 1.0)], -0.5, Color::GREEN);
        let far = ndc_tri([(-1.0, -1.0), (1.0, -1.0), (0.0, 1.0)], 0.5, Color::BLUE);
        let mut backend = SerialBackend::new(Color::BLACK);

        for order in [[near, far], [far, near]] {
            let mut fb = Framebuffer::new(16, 16);
            let stats = backend.render(&order, &mut fb).unwrap();
            assert_eq!(stats.primitives_rasterized, 2);
            assert_eq!(fb.color_at(8, 12), Color::GREEN);
            assert!((fb.depth_at(8, 12) + 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn primitive_with_zero_w_is_skipped() {
        let mut bad = ndc_tri([(-1.0, -1.0), (1.0, -1.0), (0.0, 1.0)], 0.0, Color::RED);
        bad.vertices[2].clip = Vec4::new(0.0, 1.0, 0.0, 0.0);
        let mut fb = Framebuffer::new(4, 4);
        let stats = SerialBackend::default().render(&[bad], &mut fb).unwrap();
        assert_eq!(stats.primitives_rasterized, 0);
        assert_eq!(stats.fragments_written, 0);
    }
}
