/// Screen-space tile binning
///
/// Builds a CSR inverted index from screen tile to the triangles whose pixel
/// bounding box overlaps it:
/// 1. Counting pass: per-tile counters stored at offsets[tile + 1]
/// 2. Prefix sum in place, giving each tile a fixed slice
/// 3. Fill pass: triangle indices written through per-tile cursors
///
/// Binning is bounding-box conservative. The rasterizer still runs the exact
/// edge-function test on every candidate.
use super::rasterizer::BoundingBox;
use super::types::ScreenTriangle;
use crate::error::{RenderError, Result};
use crate::perf::FUNCTION_COUNTERS;
use crate::{count_add, count_call};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Fixed partition of a framebuffer into square tiles (edge tiles may be
/// smaller).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub width: usize,
    pub height: usize,
    pub tile_size: usize,
    pub tiles_x: usize,
    pub tiles_y: usize,
}

/// Inclusive range of tile coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl TileRange {
    #[inline]
    pub fn len(&self) -> usize {
        (self.x1 - self.x0 + 1) * (self.y1 - self.y0 + 1)
    }

    /// Linear tile ids, row-major.
    pub fn tiles(&self, tiles_x: usize) -> impl Iterator<Item = usize> {
        let (x0, x1) = (self.x0, self.x1);
        (self.y0..=self.y1).flat_map(move |ty| (x0..=x1).map(move |tx| ty * tiles_x + tx))
    }
}

impl TileGrid {
    pub fn new(width: usize, height: usize, tile_size: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidDimensions { width, height });
        }
        if tile_size == 0 {
            return Err(RenderError::InvalidTileSize(tile_size));
        }
        Ok(Self {
            width,
            height,
            tile_size,
            tiles_x: (width + tile_size - 1) / tile_size,
            tiles_y: (height + tile_size - 1) / tile_size,
        })
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles_x * self.tiles_y
    }

    /// Tile containing pixel (x, y).
    #[inline]
    pub fn tile_of_pixel(&self, x: usize, y: usize) -> usize {
        (y / self.tile_size) * self.tiles_x + x / self.tile_size
    }

    /// Pixel rectangle (x0, y0, width, height) of a tile, clipped to the
    /// framebuffer.
    pub fn tile_rect(&self, tile: usize) -> (usize, usize, usize, usize) {
        let tx = tile % self.tiles_x;
        let ty = tile / self.tiles_x;
        let x0 = tx * self.tile_size;
        let y0 = ty * self.tile_size;
        let w = self.tile_size.min(self.width - x0);
        let h = self.tile_size.min(self.height - y0);
        (x0, y0, w, h)
    }

    /// Tiles touched by a clamped pixel bounding box.
    #[inline]
    pub fn tile_range(&self, bbox: &BoundingBox) -> TileRange {
        TileRange {
            x0: bbox.min_x / self.tile_size,
            y0: bbox.min_y / self.tile_size,
            x1: (bbox.max_x / self.tile_size).min(self.tiles_x - 1),
            y1: (bbox.max_y / self.tile_size).min(self.tiles_y - 1),
        }
    }

    /// Same bounding-box math as the rasterizer, converted to tiles.
    /// None for triangles entirely off screen.
    #[inline]
    pub fn triangle_tiles(&self, tri: &ScreenTriangle) -> Option<TileRange> {
        BoundingBox::of(tri, self.width, self.height).map(|bbox| self.tile_range(&bbox))
    }
}

/// CSR tile -> triangle index.
///
/// `offsets` has `tile_count + 1` entries; the candidates of tile `t` are
/// `indices[offsets[t]..offsets[t + 1]]`, in ascending triangle order.
#[derive(Debug)]
pub struct TileIndex {
    grid: TileGrid,
    offsets: Vec<u32>,
    indices: Vec<u32>,
    // Scratch for the fill pass, kept to avoid per-frame allocation
    cursors: Vec<u32>,
    atomic_counts: Vec<AtomicU32>,
    atomic_indices: Vec<AtomicU32>,
}

impl TileIndex {
    /// Empty index for `grid`: every tile has no candidates.
    pub fn new(grid: TileGrid) -> Self {
        Self::with_capacity(grid, 0)
    }

    /// Empty index with room for `entries` (triangle, tile) pairs.
    pub fn with_capacity(grid: TileGrid, entries: usize) -> Self {
        Self {
            grid,
            offsets: vec![0; grid.tile_count() + 1],
            indices: Vec::with_capacity(entries),
            cursors: Vec::with_capacity(grid.tile_count()),
            atomic_counts: Vec::new(),
            atomic_indices: Vec::new(),
        }
    }

    /// Build an index for `tris` with the serial two-pass algorithm.
    pub fn build(grid: TileGrid, tris: &[ScreenTriangle]) -> Self {
        let mut index = Self::new(grid);
        index.rebuild(tris);
        index
    }

    /// Recompute the whole index for a new batch (serial).
    /// Allocations are reused; no state from the previous batch survives.
    pub fn rebuild(&mut self, tris: &[ScreenTriangle]) {
        count_call!(FUNCTION_COUNTERS.tile_index_builds);
        let grid = self.grid;
        let tiles_x = grid.tiles_x;

        // Counting pass
        self.offsets.clear();
        self.offsets.resize(grid.tile_count() + 1, 0);
        for tri in tris {
            if let Some(range) = grid.triangle_tiles(tri) {
                for tile in range.tiles(tiles_x) {
                    self.offsets[tile + 1] += 1;
                }
            }
        }

        self.prefix_sum();

        // Fill pass
        let total = self.offsets[grid.tile_count()] as usize;
        self.indices.clear();
        self.indices.resize(total, 0);
        self.cursors.clear();
        self.cursors
            .extend_from_slice(&self.offsets[..grid.tile_count()]);
        for (i, tri) in tris.iter().enumerate() {
            if let Some(range) = grid.triangle_tiles(tri) {
                for tile in range.tiles(tiles_x) {
                    let slot = self.cursors[tile] as usize;
                    self.indices[slot] = i as u32;
                    self.cursors[tile] += 1;
                }
            }
        }

        count_add!(FUNCTION_COUNTERS.tile_bin_entries, total);
        log::trace!(
            "binned {} triangles into {} tiles ({} entries)",
            tris.len(),
            grid.tile_count(),
            total
        );
    }

    /// Same index as [`TileIndex::rebuild`], with both passes spread across
    /// triangles. Per-tile slots are claimed with atomic cursors, then each
    /// tile slice is sorted so the result is independent of scheduling.
    pub fn rebuild_parallel(&mut self, tris: &[ScreenTriangle]) {
        count_call!(FUNCTION_COUNTERS.tile_index_builds);
        let grid = self.grid;
        let tiles_x = grid.tiles_x;
        let tile_count = grid.tile_count();

        reset_atomics(&mut self.atomic_counts, tile_count + 1);
        {
            let counts = &self.atomic_counts;
            tris.par_iter().for_each(|tri| {
                if let Some(range) = grid.triangle_tiles(tri) {
                    for tile in range.tiles(tiles_x) {
                        counts[tile + 1].fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }

        self.offsets.clear();
        self.offsets
            .extend(self.atomic_counts.iter().map(|c| c.load(Ordering::Relaxed)));
        self.prefix_sum();

        let total = self.offsets[tile_count] as usize;
        // Cursors reuse the counter storage, seeded from the offsets.
        for (cursor, &offset) in self.atomic_counts.iter().zip(&self.offsets[..tile_count]) {
            cursor.store(offset, Ordering::Relaxed);
        }
        reset_atomics(&mut self.atomic_indices, total);
        {
            let cursors = &self.atomic_counts;
            let slots = &self.atomic_indices;
            tris.par_iter().enumerate().for_each(|(i, tri)| {
                if let Some(range) = grid.triangle_tiles(tri) {
                    for tile in range.tiles(tiles_x) {
                        let slot = cursors[tile].fetch_add(1, Ordering::Relaxed) as usize;
                        slots[slot].store(i as u32, Ordering::Relaxed);
                    }
                }
            });
        }

        self.indices.clear();
        self.indices
            .extend(self.atomic_indices.iter().map(|s| s.load(Ordering::Relaxed)));

        sort_tile_slices(&mut self.indices, &self.offsets, 0);

        count_add!(FUNCTION_COUNTERS.tile_bin_entries, total);
    }

    fn prefix_sum(&mut self) {
        for t in 1..self.offsets.len() {
            self.offsets[t] += self.offsets[t - 1];
        }
    }

    #[inline]
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Candidate triangle indices for `tile`.
    #[inline]
    pub fn candidates(&self, tile: usize) -> &[u32] {
        let start = self.offsets[tile] as usize;
        let end = self.offsets[tile + 1] as usize;
        &self.indices[start..end]
    }

    /// Candidates for the tile containing pixel (x, y).
    #[inline]
    pub fn candidates_for_pixel(&self, x: usize, y: usize) -> &[u32] {
        self.candidates(self.grid.tile_of_pixel(x, y))
    }

    #[inline]
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Total (triangle, tile) pairs.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.indices.len()
    }
}

fn reset_atomics(buf: &mut Vec<AtomicU32>, len: usize) {
    buf.truncate(len);
    for a in buf.iter() {
        a.store(0, Ordering::Relaxed);
    }
    buf.resize_with(len, || AtomicU32::new(0));
}

/// Tiles sorted serially per task in `sort_tile_slices`.
const SORT_GRAIN_TILES: usize = 64;

/// Sort every tile's slice of `indices` in place. `offsets` covers a run of
/// tiles whose first entry sits at `base` in the full index; the run is
/// halved with `rayon::join` until it is small.
fn sort_tile_slices(indices: &mut [u32], offsets: &[u32], base: u32) {
    let tiles = offsets.len().saturating_sub(1);
    if tiles <= SORT_GRAIN_TILES {
        for window in offsets.windows(2) {
            let start = (window[0] - base) as usize;
            let end = (window[1] - base) as usize;
            indices[start..end].sort_unstable();
        }
        return;
    }
    let mid = tiles / 2;
    let (low, high) = indices.split_at_mut((offsets[mid] - base) as usize);
    rayon::join(
        || sort_tile_slices(low, &offsets[..=mid], base),
        || sort_tile_slices(high, &offsets[mid..], offsets[mid]),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    fn tri(p: [Vec2; 3]) -> ScreenTriangle {
        ScreenTriangle {
            positions: p.map(|v| v.extend(0.0)),
            inv_w: [1.0; 3],
            color_over_w: [Vec3::ONE; 3],
        }
    }

    #[test]
    fn grid_rounds_partial_tiles_up() {
        let grid = TileGrid::new(100, 33, 16).unwrap();
        assert_eq!((grid.tiles_x, grid.tiles_y), (7, 3));
        assert_eq!(grid.tile_rect(6), (96, 0, 4, 16));
        assert_eq!(grid.tile_rect(20), (96, 32, 4, 1));
    }

    #[test]
    fn invalid_grids_are_rejected() {
        assert!(matches!(
            TileGrid::new(0, 10, 16),
            Err(RenderError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            TileGrid::new(10, 10, 0),
            Err(RenderError::InvalidTileSize(0))
        ));
    }

    #[test]
    fn triangle_inside_one_tile_lands_in_one_bin() {
        let grid = TileGrid::new(64, 64, 16).unwrap();
        let tris = [tri([Vec2::new(18.0, 18.0), Vec2::new(28.0, 18.0), Vec2::new(20.0, 28.0)])];
        let index = TileIndex::build(grid, &tris);
        assert_eq!(index.entry_count(), 1);
        assert_eq!(index.candidates(grid.tile_of_pixel(20, 20)), &[0]);
        assert_eq!(index.offsets().len(), grid.tile_count() + 1);
    }

    #[test]
    fn spanning_triangle_is_binned_to_every_overlapped_tile() {
        let grid = TileGrid::new(64, 64, 16).unwrap();
        let tris = [
            tri([Vec2::new(1.0, 1.0), Vec2::new(5.0, 1.0), Vec2::new(1.0, 5.0)]),
            tri([Vec2::new(10.0, 10.0), Vec2::new(40.0, 12.0), Vec2::new(20.0, 35.0)]),
        ];
        let index = TileIndex::build(grid, &tris);
        // Second triangle bbox 10..=40 x 10..=35 -> tiles x 0..=2, y 0..=2
        assert_eq!(index.entry_count(), 1 + 9);
        assert_eq!(index.candidates(0), &[0, 1]);
        assert_eq!(index.candidates(2 * 4 + 2), &[1]);
        assert!(index.candidates(3).is_empty());
    }

    #[test]
    fn offscreen_triangle_is_not_binned() {
        let grid = TileGrid::new(32, 32, 16).unwrap();
        let tris = [tri([Vec2::new(40.0, 0.0), Vec2::new(60.0, 0.0), Vec2::new(50.0, 9.0)])];
        let index = TileIndex::build(grid, &tris);
        assert_eq!(index.entry_count(), 0);
        assert!(index.offsets().iter().all(|&o| o == 0));
    }

    #[test]
    fn parallel_build_matches_serial_build() {
        let grid = TileGrid::new(128, 96, 16).unwrap();
        let tris: Vec<ScreenTriangle> = (0..200)
            .map(|i| {
                let x = (i * 37 % 140) as f32 - 6.0;
                let y = (i * 53 % 110) as f32 - 6.0;
                tri([
                    Vec2::new(x, y),
                    Vec2::new(x + 20.0, y + 3.0),
                    Vec2::new(x + 4.0, y + 25.0),
                ])
            })
            .collect();

        let serial = TileIndex::build(grid, &tris);
        let mut parallel = TileIndex::new(grid);
        parallel.rebuild_parallel(&tris);
        assert_eq!(serial.offsets(), parallel.offsets());
        assert_eq!(serial.indices(), parallel.indices());

        // Rebuilding with a smaller batch leaves nothing stale behind.
        parallel.rebuild_parallel(&tris[..3]);
        let small = TileIndex::build(grid, &tris[..3]);
        assert_eq!(small.indices(), parallel.indices());
    }

    #[test]
    fn tile_slices_are_sorted_independently() {
        // 300 tiles of 0..=4 entries each, every slice in descending order
        let mut offsets = vec![0u32];
        let mut indices = Vec::new();
        for tile in 0..300u32 {
            let len = tile % 5;
            indices.extend((0..len).rev().map(|k| tile * 10 + k));
            offsets.push(indices.len() as u32);
        }
        sort_tile_slices(&mut indices, &offsets, 0);

        for (tile, window) in offsets.windows(2).enumerate() {
            let slice = &indices[window[0] as usize..window[1] as usize];
            let expected: Vec<u32> = (0..tile as u32 % 5).map(|k| tile as u32 * 10 + k).collect();
            assert_eq!(slice, expected.as_slice(), "tile {tile}");
        }
    }

    #[test]
    fn repeated_parallel_rebuilds_reuse_storage() {
        let grid = TileGrid::new(256, 256, 8).unwrap();
        let tris: Vec<ScreenTriangle> = (0..100)
            .map(|i| {
                let o = (i * 13 % 200) as f32;
                tri([Vec2::new(o, o), Vec2::new(o + 40.0, o), Vec2::new(o, o + 40.0)])
            })
            .collect();
        let mut index = TileIndex::new(grid);
        index.rebuild_parallel(&tris);
        let capacity = index.indices.capacity();
        for _ in 0..3 {
            index.rebuild_parallel(&tris);
            assert_eq!(index.indices.capacity(), capacity);
        }
        assert_eq!(index.indices(), TileIndex::build(grid, &tris).indices());
    }
}
