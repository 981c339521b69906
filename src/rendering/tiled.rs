/// Tile-binned, pixel-parallel backend
///
/// Models an accelerator launch: a fixed-capacity triangle upload, a CSR
/// tile index, one logical worker per pixel and a final download into the
/// caller's framebuffer. Buffers are acquired once at construction and
/// released once on drop; every frame reuses them.
///
/// Each worker reads only its tile's candidate list and writes only its own
/// pixel, so the framebuffer needs no synchronization. Triangle data and the
/// tile index are read-only for the duration of the launch.
use super::backend::RasterBackend;
use super::framebuffer::{FrameSlice, Framebuffer};
use super::rasterizer::{BoundingBox, TriangleSetup};
use super::tile_binner::{TileGrid, TileIndex};
use super::types::{Color, FrameStats, Primitive, ScreenTriangle, Vertex};
use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::perf_scope;
use glam::{Vec3, Vec4};
use rayon::prelude::*;

/// Upload layout of one vertex: clip position (4 floats) + color (3 floats).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PackedVertex {
    pub position: [f32; 4],
    pub color: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PackedTriangle {
    pub vertices: [PackedVertex; 3],
}

impl PackedTriangle {
    pub fn pack(prim: &Primitive) -> Self {
        Self {
            vertices: prim.vertices.map(|v| PackedVertex {
                position: v.clip.to_array(),
                color: v.color.to_array(),
            }),
        }
    }

    pub fn unpack(&self) -> Primitive {
        let [a, b, c] = self.vertices.map(|v| {
            Vertex::new(Vec4::from_array(v.position), Vec3::from_array(v.color))
        });
        Primitive::new(a, b, c)
    }
}

/// Triangle as seen by a pixel worker: exact-coverage setup plus the pixel
/// bounds the serial scan would visit.
#[derive(Copy, Clone, Debug)]
struct BinnedTriangle {
    bbox: BoundingBox,
    setup: TriangleSetup,
}

/// Device-side allocation, sized for `capacity` triangles.
pub struct DeviceBuffers {
    capacity: usize,
    grid: TileGrid,
    triangles: Vec<PackedTriangle>,
    screen: Vec<ScreenTriangle>,
    binned: Vec<Option<BinnedTriangle>>,
    index: TileIndex,
    target: Framebuffer,
}

impl DeviceBuffers {
    pub fn allocate(grid: TileGrid, capacity: usize) -> Self {
        log::info!(
            "allocating device buffers: {} triangles, {}x{} target, {} tiles",
            capacity,
            grid.width,
            grid.height,
            grid.tile_count()
        );
        Self {
            capacity,
            grid,
            triangles: Vec::with_capacity(capacity),
            screen: Vec::with_capacity(capacity),
            binned: Vec::with_capacity(capacity),
            index: TileIndex::with_capacity(grid, capacity),
            target: Framebuffer::new(grid.width, grid.height),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy a batch into the triangle buffer. The batch must already have
    /// been checked against the capacity.
    pub fn upload(&mut self, primitives: &[Primitive]) {
        debug_assert!(primitives.len() <= self.capacity);
        self.triangles.clear();
        self.triangles
            .extend(primitives.iter().map(PackedTriangle::pack));
    }

    /// Divide/map every uploaded triangle and rebuild the tile index.
    /// Returns the number of triangles with a valid screen projection.
    fn bin(&mut self) -> usize {
        let (width, height) = (self.grid.width, self.grid.height);
        self.screen.clear();
        self.binned.clear();
        for packed in &self.triangles {
            let Some(tri) = ScreenTriangle::from_primitive(&packed.unpack(), width, height) else {
                continue;
            };
            let binned = BoundingBox::of(&tri, width, height).and_then(|bbox| {
                TriangleSetup::new(&tri).map(|setup| BinnedTriangle { bbox, setup })
            });
            self.screen.push(tri);
            self.binned.push(binned);
        }
        self.index.rebuild_parallel(&self.screen);
        self.screen.len()
    }

    /// Launch one worker per pixel over row stripes.
    /// Returns the number of depth-test passes.
    fn rasterize(&mut self, clear_color: Color) -> usize {
        self.target.clear(clear_color);
        let index = &self.index;
        let binned = &self.binned;
        let stripes = self.grid.tiles_y;

        let mut slices = self.target.split_into_stripes(stripes);
        slices
            .par_iter_mut()
            .map(|slice| shade_stripe(slice, index, binned))
            .sum()
    }

    /// Copy color and depth back into the caller's framebuffer.
    pub fn download(&self, framebuffer: &mut Framebuffer) {
        framebuffer
            .color_buffer
            .copy_from_slice(&self.target.color_buffer);
        framebuffer
            .depth_buffer
            .copy_from_slice(&self.target.depth_buffer);
    }
}

impl Drop for DeviceBuffers {
    fn drop(&mut self) {
        log::info!(
            "releasing device buffers ({} triangles, {}x{})",
            self.capacity,
            self.grid.width,
            self.grid.height
        );
    }
}

/// Per-pixel work for every pixel of one stripe. Candidates are evaluated
/// in submission order against the pixel's own depth, exactly like the
/// serial path.
fn shade_stripe(
    slice: &mut FrameSlice<'_>,
    index: &TileIndex,
    binned: &[Option<BinnedTriangle>],
) -> usize {
    let mut passed = 0usize;
    for y in slice.y0..slice.y0 + slice.height {
        for x in 0..slice.width {
            for &candidate in index.candidates_for_pixel(x, y) {
                let Some(tri) = &binned[candidate as usize] else {
                    continue;
                };
                if !tri.bbox.contains(x, y) {
                    continue;
                }
                if let Some(fragment) = tri.setup.sample(x, y) {
                    if slice.write_fragment(x, y, &fragment) {
                        passed += 1;
                    }
                }
            }
        }
    }
    passed
}

pub struct TiledBackend {
    buffers: DeviceBuffers,
    clear_color: Color,
}

impl TiledBackend {
    pub fn new(
        width: usize,
        height: usize,
        tile_size: usize,
        max_triangles: usize,
        clear_color: Color,
    ) -> Result<Self> {
        let grid = TileGrid::new(width, height, tile_size)?;
        Ok(Self {
            buffers: DeviceBuffers::allocate(grid, max_triangles),
            clear_color,
        })
    }

    pub fn from_config(config: &RenderConfig) -> Result<Self> {
        Self::new(
            config.width,
            config.height,
            config.tile_size,
            config.max_triangles,
            config.clear_color,
        )
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffers.capacity()
    }

    #[inline]
    pub fn grid(&self) -> &TileGrid {
        &self.buffers.grid
    }

    /// Tile index built by the most recent frame.
    #[inline]
    pub fn tile_index(&self) -> &TileIndex {
        &self.buffers.index
    }
}

impl RasterBackend for TiledBackend {
    fn name(&self) -> &'static str {
        "tiled"
    }

    fn render(
        &mut self,
        primitives: &[Primitive],
        framebuffer: &mut Framebuffer,
    ) -> Result<FrameStats> {
        perf_scope!("tiled_render");

        if primitives.len() > self.buffers.capacity {
            log::warn!(
                "frame aborted: {} triangles exceed capacity {}",
                primitives.len(),
                self.buffers.capacity
            );
            return Err(RenderError::CapacityExceeded {
                requested: primitives.len(),
                capacity: self.buffers.capacity,
            });
        }
        let expected = (self.buffers.grid.width, self.buffers.grid.height);
        if framebuffer.dimensions() != expected {
            return Err(RenderError::DimensionMismatch {
                expected,
                actual: framebuffer.dimensions(),
            });
        }

        self.buffers.upload(primitives);
        let rasterized = self.buffers.bin();
        let fragments = self.buffers.rasterize(self.clear_color);
        self.buffers.download(framebuffer);

        Ok(FrameStats {
            primitives_rasterized: rasterized,
            bin_entries: self.buffers.index.entry_count(),
            fragments_written: fragments,
            ..FrameStats::default()
        })
    }
}
