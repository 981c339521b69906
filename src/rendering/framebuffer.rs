/// Framebuffer for software rendering
/// Stores color and depth information
///
/// Memory layout:
/// - Hot metadata (width, height) stored first for bounds checking
/// - Color and depth are separate Vecs, both row-major and indexed by y * width + x
use super::fragment::depth_test_write;
use super::rasterizer::ndc_to_screen;
use super::types::{Color, Fragment};
use crate::count_call;
use crate::perf::FUNCTION_COUNTERS;
use glam::{Vec2, Vec3};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::{
    _mm256_set1_epi32, _mm256_set1_ps, _mm256_storeu_ps, _mm256_storeu_si256, _mm_set1_epi32,
    _mm_set1_ps, _mm_storeu_ps, _mm_storeu_si128,
};

/// View into a contiguous set of rows in the framebuffer.
/// Used for multi-core rasterization where each worker owns a disjoint slice.
pub struct FrameSlice<'a> {
    pub width: usize,
    pub full_height: usize,
    pub y0: usize,
    pub height: usize,
    pub color: &'a mut [u32],
    pub depth: &'a mut [f32],
}

impl<'a> FrameSlice<'a> {
    /// Local linear index of global pixel (x, y_global), or None if the pixel
    /// lies outside this slice.
    #[inline]
    pub fn local_index(&self, x: usize, y_global: usize) -> Option<usize> {
        if x >= self.width || y_global < self.y0 {
            return None;
        }
        let y_local = y_global - self.y0;
        if y_local >= self.height {
            return None;
        }
        Some(y_local * self.width + x)
    }

    /// Depth test at (x, y_global); on pass, writes color and depth together.
    #[inline]
    pub fn write_fragment(&mut self, x: usize, y_global: usize, fragment: &Fragment) -> bool {
        match self.local_index(x, y_global) {
            Some(index) => depth_test_write(self.color, self.depth, index, fragment),
            None => false,
        }
    }
}

pub struct Framebuffer {
    // Hot data: used for every bounds check and index calculation
    pub width: usize,
    pub height: usize,
    pub color_buffer: Vec<u32>, // ARGB format
    pub depth_buffer: Vec<f32>,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        let pixel_count = width * height;
        Self {
            width,
            height,
            color_buffer: vec![Color::BLACK.to_argb(); pixel_count],
            depth_buffer: vec![f32::INFINITY; pixel_count],
        }
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Clear color to `clear_color` and depth to +inf (furthest)
    pub fn clear(&mut self, clear_color: Color) {
        count_call!(FUNCTION_COUNTERS.framebuffer_clear_calls);
        self.clear_impl(clear_color.to_argb());
    }

    #[inline]
    fn clear_impl(&mut self, clear_color: u32) {
        #[cfg(target_arch = "x86_64")]
        {
            // Prefer AVX (8 pixels per iteration), otherwise SSE2 (4 pixels).
            if std::arch::is_x86_feature_detected!("avx") {
                unsafe {
                    return self.clear_simd_avx(clear_color);
                }
            }
            if std::arch::is_x86_feature_detected!("sse2") {
                unsafe {
                    return self.clear_simd_sse2(clear_color);
                }
            }
        }

        self.color_buffer.fill(clear_color);
        self.depth_buffer.fill(f32::INFINITY);
    }

    /// SIMD-accelerated clear for x86_64 with SSE2.
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "sse2")]
    unsafe fn clear_simd_sse2(&mut self, clear_color: u32) {
        let len = self.color_buffer.len();
        let mut i = 0usize;
        let color_vec = _mm_set1_epi32(clear_color as i32);
        while i + 4 <= len {
            let ptr = self.color_buffer.as_mut_ptr().add(i) as *mut _;
            _mm_storeu_si128(ptr, color_vec);
            i += 4;
        }
        self.color_buffer[i..].fill(clear_color);

        let len_d = self.depth_buffer.len();
        let mut k = 0usize;
        let depth_vec = _mm_set1_ps(f32::INFINITY);
        while k + 4 <= len_d {
            _mm_storeu_ps(self.depth_buffer.as_mut_ptr().add(k), depth_vec);
            k += 4;
        }
        self.depth_buffer[k..].fill(f32::INFINITY);
    }

    /// SIMD-accelerated clear for x86_64 with AVX.
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    unsafe fn clear_simd_avx(&mut self, clear_color: u32) {
        let len = self.color_buffer.len();
        let mut i = 0usize;
        let color_vec = _mm256_set1_epi32(clear_color as i32);
        while i + 8 <= len {
            let ptr = self.color_buffer.as_mut_ptr().add(i) as *mut _;
            _mm256_storeu_si256(ptr, color_vec);
            i += 8;
        }
        self.color_buffer[i..].fill(clear_color);

        let len_d = self.depth_buffer.len();
        let mut k = 0usize;
        let depth_vec = _mm256_set1_ps(f32::INFINITY);
        while k + 8 <= len_d {
            _mm256_storeu_ps(self.depth_buffer.as_mut_ptr().add(k), depth_vec);
            k += 8;
        }
        self.depth_buffer[k..].fill(f32::INFINITY);
    }

    /// Set pixel with depth test
    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, color: Color, depth: f32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let fragment = Fragment {
            depth,
            color: color.to_vec3(),
        };
        self.write_fragment(x, y, &fragment)
    }

    /// Fragment-stage write: depth test at (x, y), color+depth replaced on pass.
    /// Callers guarantee (x, y) is inside the buffer.
    #[inline]
    pub fn write_fragment(&mut self, x: usize, y: usize, fragment: &Fragment) -> bool {
        let index = y * self.width + x;
        depth_test_write(&mut self.color_buffer, &mut self.depth_buffer, index, fragment)
    }

    #[inline]
    pub fn color_at(&self, x: usize, y: usize) -> Color {
        Color::from_argb(self.color_buffer[y * self.width + x])
    }

    #[inline]
    pub fn depth_at(&self, x: usize, y: usize) -> f32 {
        self.depth_buffer[y * self.width + x]
    }

    /// RGB triple at (x, y)
    #[inline]
    pub fn rgb_at(&self, x: usize, y: usize) -> [u8; 3] {
        let c = self.color_at(x, y);
        [c.r, c.g, c.b]
    }

    /// Get color buffer as slice
    pub fn color_buffer_slice(&self) -> &[u32] {
        &self.color_buffer
    }

    /// Row-major RGB triples, 3 bytes per pixel
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.color_buffer.len() * 3);
        for &argb in &self.color_buffer {
            let c = Color::from_argb(argb);
            bytes.extend_from_slice(&[c.r, c.g, c.b]);
        }
        bytes
    }

    /// Map NDC to screen space: x right, y down, z passed through as depth.
    #[inline]
    pub fn to_screen(&self, ndc: Vec3) -> Vec3 {
        ndc_to_screen(ndc, self.width as f32, self.height as f32)
    }

    /// Write the color buffer as binary PPM (P6).
    pub fn write_ppm<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        write!(writer, "P6\n{} {}\n255\n", self.width, self.height)?;
        writer.write_all(&self.to_rgb_bytes())?;
        writer.flush()
    }

    pub fn save_ppm(&self, path: impl AsRef<Path>) -> crate::error::Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_ppm(BufWriter::new(file))?;
        log::info!(
            "wrote {}x{} image to {}",
            self.width,
            self.height,
            path.as_ref().display()
        );
        Ok(())
    }

    /// Depth-tested Bresenham line from p0 to p1 in screen space.
    /// The segment is first clipped to the buffer, so only visible pixels are
    /// stepped; depth is interpolated linearly along the clipped segment.
    /// Returns the number of pixels written.
    pub fn draw_line(&mut self, p0: Vec2, p1: Vec2, z0: f32, z1: f32, color: Color) -> usize {
        if self.width == 0 || self.height == 0 || !(p0.is_finite() && p1.is_finite()) {
            return 0;
        }
        let a = (p0.x as f64, p0.y as f64);
        let b = (p1.x as f64, p1.y as f64);
        let Some((ta, tb)) = clip_segment_to_rect(a, b, self.width as f64, self.height as f64)
        else {
            return 0;
        };

        let (max_x, max_y) = (self.width as i64 - 1, self.height as i64 - 1);
        let to_pixel = |t: f64| {
            let x = a.0 + (b.0 - a.0) * t;
            let y = a.1 + (b.1 - a.1) * t;
            ((x.floor() as i64).clamp(0, max_x), (y.floor() as i64).clamp(0, max_y))
        };
        let (x0, y0) = to_pixel(ta);
        let (x1, y1) = to_pixel(tb);
        let za = z0 + (z1 - z0) * ta as f32;
        let zb = z0 + (z1 - z0) * tb as f32;

        let dx = (x1 - x0).abs();
        let dy = (y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx - dy;

        let (mut x, mut y) = (x0, y0);
        let mut written = 0;
        loop {
            let t = if dx >= dy {
                if dx != 0 { (x - x0) as f32 / (x1 - x0) as f32 } else { 0.0 }
            } else {
                (y - y0) as f32 / (y1 - y0) as f32
            };
            let depth = (1.0 - t) * za + t * zb;

            if self.set_pixel(x as usize, y as usize, color, depth) {
                written += 1;
            }

            if x == x1 && y == y1 {
                break;
            }
            let e2 = err * 2;
            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
        }
        written
    }

    /// Resize framebuffer
    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        let pixel_count = width * height;
        self.color_buffer.resize(pixel_count, Color::BLACK.to_argb());
        self.depth_buffer.resize(pixel_count, f32::INFINITY);
    }

    /// Split the framebuffer into horizontal stripes for multi-core rendering.
    /// Each stripe owns a disjoint subset of rows, so they can be rendered in parallel.
    pub fn split_into_stripes(&mut self, stripes: usize) -> Vec<FrameSlice<'_>> {
        let stripes = stripes.max(1);
        let width = self.width;
        let height = self.height;

        let mut slices = Vec::with_capacity(stripes);

        let mut remaining_color: &mut [u32] = self.color_buffer.as_mut_slice();
        let mut remaining_depth: &mut [f32] = self.depth_buffer.as_mut_slice();

        let mut y0 = 0usize;
        let rows_per_stripe = (height + stripes - 1) / stripes;

        for _ in 0..stripes {
            if y0 >= height {
                break;
            }
            let rows = (height - y0).min(rows_per_stripe);
            let pixels = rows * width;

            let (color_head, color_tail) = remaining_color.split_at_mut(pixels);
            let (depth_head, depth_tail) = remaining_depth.split_at_mut(pixels);

            slices.push(FrameSlice {
                width,
                full_height: height,
                y0,
                height: rows,
                color: color_head,
                depth: depth_head,
            });

            remaining_color = color_tail;
            remaining_depth = depth_tail;
            y0 += rows;
        }

        slices
    }
}

/// Liang-Barsky: parameter range [t0, t1] of `a + t (b - a)` that lies in
/// [0, max_x] x [0, max_y], or None when the segment misses the rectangle.
fn clip_segment_to_rect(
    a: (f64, f64),
    b: (f64, f64),
    max_x: f64,
    max_y: f64,
) -> Option<(f64, f64)> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [(-dx, a.0), (dx, max_x - a.0), (-dy, a.1), (dy, max_y - a.1)] {
        if p == 0.0 {
            // Parallel to this edge
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((t0, t1))
}
