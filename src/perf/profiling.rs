/// Instrumentation for microoptimization of the raster hot paths
/// Counters are global atomics, incremented only with the `profiling` feature.
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe performance counters for pipeline stage tracking
pub struct FunctionCounters {
    // Geometry counters
    pub triangles_submitted: AtomicU64,
    pub triangles_near_rejected: AtomicU64,
    pub triangles_backface_culled: AtomicU64,
    pub primitives_clipped_away: AtomicU64,
    pub clip_output_triangles: AtomicU64,

    // Rasterization counters
    pub rasterize_triangle_calls: AtomicU64,
    pub degenerate_triangles: AtomicU64,
    pub fragments_tested: AtomicU64,
    pub depth_test_passed: AtomicU64,
    pub depth_test_failed: AtomicU64,

    // Binning counters
    pub tile_index_builds: AtomicU64,
    pub tile_bin_entries: AtomicU64,

    // Framebuffer counters
    pub framebuffer_clear_calls: AtomicU64,
}

impl FunctionCounters {
    pub const fn new() -> Self {
        Self {
            triangles_submitted: AtomicU64::new(0),
            triangles_near_rejected: AtomicU64::new(0),
            triangles_backface_culled: AtomicU64::new(0),
            primitives_clipped_away: AtomicU64::new(0),
            clip_output_triangles: AtomicU64::new(0),
            rasterize_triangle_calls: AtomicU64::new(0),
            degenerate_triangles: AtomicU64::new(0),
            fragments_tested: AtomicU64::new(0),
            depth_test_passed: AtomicU64::new(0),
            depth_test_failed: AtomicU64::new(0),
            tile_index_builds: AtomicU64::new(0),
            tile_bin_entries: AtomicU64::new(0),
            framebuffer_clear_calls: AtomicU64::new(0),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        for counter in self.all() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn all(&self) -> [&AtomicU64; 13] {
        [
            &self.triangles_submitted,
            &self.triangles_near_rejected,
            &self.triangles_backface_culled,
            &self.primitives_clipped_away,
            &self.clip_output_triangles,
            &self.rasterize_triangle_calls,
            &self.degenerate_triangles,
            &self.fragments_tested,
            &self.depth_test_passed,
            &self.depth_test_failed,
            &self.tile_index_builds,
            &self.tile_bin_entries,
            &self.framebuffer_clear_calls,
        ]
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            triangles_submitted: self.triangles_submitted.load(Ordering::Relaxed),
            triangles_near_rejected: self.triangles_near_rejected.load(Ordering::Relaxed),
            triangles_backface_culled: self.triangles_backface_culled.load(Ordering::Relaxed),
            primitives_clipped_away: self.primitives_clipped_away.load(Ordering::Relaxed),
            clip_output_triangles: self.clip_output_triangles.load(Ordering::Relaxed),
            rasterize_triangle_calls: self.rasterize_triangle_calls.load(Ordering::Relaxed),
            degenerate_triangles: self.degenerate_triangles.load(Ordering::Relaxed),
            fragments_tested: self.fragments_tested.load(Ordering::Relaxed),
            depth_test_passed: self.depth_test_passed.load(Ordering::Relaxed),
            depth_test_failed: self.depth_test_failed.load(Ordering::Relaxed),
            tile_index_builds: self.tile_index_builds.load(Ordering::Relaxed),
            tile_bin_entries: self.tile_bin_entries.load(Ordering::Relaxed),
            framebuffer_clear_calls: self.framebuffer_clear_calls.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSnapshot {
    pub triangles_submitted: u64,
    pub triangles_near_rejected: u64,
    pub triangles_backface_culled: u64,
    pub primitives_clipped_away: u64,
    pub clip_output_triangles: u64,
    pub rasterize_triangle_calls: u64,
    pub degenerate_triangles: u64,
    pub fragments_tested: u64,
    pub depth_test_passed: u64,
    pub depth_test_failed: u64,
    pub tile_index_builds: u64,
    pub tile_bin_entries: u64,
    pub framebuffer_clear_calls: u64,
}

impl CounterSnapshot {
    /// Print formatted report
    pub fn print_report(&self) {
        println!("\n=== Performance Counters Report ===");
        println!("\nGeometry:");
        println!("  triangles submitted:        {:12}", self.triangles_submitted);
        println!("  near-plane rejected:        {:12}", self.triangles_near_rejected);
        println!("  back-face culled:           {:12}", self.triangles_backface_culled);
        println!("  clipped away:               {:12}", self.primitives_clipped_away);
        println!("  clipper output triangles:   {:12}", self.clip_output_triangles);

        println!("\nRasterization:");
        println!("  rasterize_triangle calls:   {:12}", self.rasterize_triangle_calls);
        println!("  degenerate triangles:       {:12}", self.degenerate_triangles);
        println!("  fragments tested:           {:12}", self.fragments_tested);
        println!("  depth test passed:          {:12}", self.depth_test_passed);
        println!("  depth test failed:          {:12}", self.depth_test_failed);
        if self.fragments_tested > 0 {
            let pass_rate =
                (self.depth_test_passed as f64 / self.fragments_tested as f64) * 100.0;
            println!("  depth test pass rate:       {:11.2}%", pass_rate);
        }

        println!("\nBinning:");
        println!("  tile index builds:          {:12}", self.tile_index_builds);
        println!("  tile bin entries:           {:12}", self.tile_bin_entries);

        println!("\nFramebuffer:");
        println!("  framebuffer clear calls:    {:12}", self.framebuffer_clear_calls);

        println!();
    }
}

/// Global function counters instance
pub static FUNCTION_COUNTERS: FunctionCounters = FunctionCounters::new();

/// Macro for incrementing a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_call {
    ($counter:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Macro for adding to a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_add {
    ($counter:expr, $value:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add($value as u64, std::sync::atomic::Ordering::Relaxed);
        }
    };
}
