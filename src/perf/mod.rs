/// Stage timing and hot-path counters
/// Timers report through the `tile_raster::perf` log target at debug level;
/// counters live in [`profiling`].
pub mod profiling;

pub use profiling::{CounterSnapshot, FunctionCounters, FUNCTION_COUNTERS};

use std::time::{Duration, Instant};

const LOG_TARGET: &str = "tile_raster::perf";

/// Scope timer for one pipeline stage. The clock is only read when the
/// perf target is enabled at debug level.
pub struct PerfTimer {
    stage: &'static str,
    start: Option<Instant>,
}

impl PerfTimer {
    #[inline]
    pub fn new(stage: &'static str) -> Self {
        let start = log::log_enabled!(target: LOG_TARGET, log::Level::Debug).then(Instant::now);
        Self { stage, start }
    }

    #[inline]
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Time since construction, or None when timing is disabled.
    #[inline]
    pub fn elapsed(&self) -> Option<Duration> {
        self.start.map(|start| start.elapsed())
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        if let Some(elapsed) = self.elapsed() {
            log::debug!(target: LOG_TARGET, "{}: {}μs", self.stage, elapsed.as_micros());
        }
    }
}

/// Time the rest of the enclosing scope as pipeline stage `$stage`.
#[macro_export]
macro_rules! perf_scope {
    ($stage:expr) => {
        let _timer = $crate::perf::PerfTimer::new($stage);
    };
}
