/// Fragment stage: depth test and framebuffer write
///
/// Smaller depth is nearer. Buffers are cleared to +inf, a fragment passes
/// only when strictly nearer than what is stored, and on pass color and depth
/// are replaced together. No blending.
use super::rasterizer::PixelTarget;
use super::types::{Color, Fragment};
use crate::count_call;
use crate::perf::FUNCTION_COUNTERS;

/// Submit one fragment for pixel (x, y) to any render target.
#[inline]
pub fn fragment_stage<T: PixelTarget + ?Sized>(
    target: &mut T,
    x: usize,
    y: usize,
    fragment: &Fragment,
) -> bool {
    target.write_fragment(x, y, fragment)
}

/// Depth test against `depth[index]`; on pass writes both buffers.
#[inline(always)]
pub(crate) fn depth_test_write(
    color: &mut [u32],
    depth: &mut [f32],
    index: usize,
    fragment: &Fragment,
) -> bool {
    count_call!(FUNCTION_COUNTERS.fragments_tested);
    if fragment.depth < depth[index] {
        depth[index] = fragment.depth;
        color[index] = Color::from_vec3(fragment.color).to_argb();
        count_call!(FUNCTION_COUNTERS.depth_test_passed);
        true
    } else {
        count_call!(FUNCTION_COUNTERS.depth_test_failed);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::Framebuffer;

    fn frag(depth: f32, color: Color) -> Fragment {
        Fragment {
            depth,
            color: color.to_vec3(),
        }
    }

    #[test]
    fn nearer_fragment_overwrites_farther() {
        let mut fb = Framebuffer::new(4, 4);
        assert!(fragment_stage(&mut fb, 1, 1, &frag(0.8, Color::RED)));
        assert!(fragment_stage(&mut fb, 1, 1, &frag(0.2, Color::BLUE)));
        assert_eq!(fb.color_at(1, 1), Color::BLUE);
        assert_eq!(fb.depth_at(1, 1), 0.2);
    }

    #[test]
    fn farther_fragment_leaves_buffer_unchanged() {
        let mut fb = Framebuffer::new(4, 4);
        assert!(fragment_stage(&mut fb, 2, 3, &frag(0.2, Color::BLUE)));
        assert!(!fragment_stage(&mut fb, 2, 3, &frag(0.8, Color::RED)));
        assert_eq!(fb.color_at(2, 3), Color::BLUE);
        assert_eq!(fb.depth_at(2, 3), 0.2);
    }

    #[test]
    fn equal_depth_does_not_pass() {
        let mut fb = Framebuffer::new(2, 2);
        assert!(fragment_stage(&mut fb, 0, 0, &frag(0.5, Color::GREEN)));
        assert!(!fragment_stage(&mut fb, 0, 0, &frag(0.5, Color::RED)));
        assert_eq!(fb.color_at(0, 0), Color::GREEN);
    }
}
