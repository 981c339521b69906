/// tile_raster - software triangle rasterizer
/// Homogeneous clipping, perspective-correct interpolation and a
/// tile-binned pixel-parallel backend
pub mod camera;
pub mod config;
pub mod error;
pub mod perf;
pub mod rendering;

pub use camera::{Camera, CameraController};
pub use config::{BackendKind, RenderConfig};
pub use error::{RenderError, Result};
pub use perf::{CounterSnapshot, FunctionCounters, FUNCTION_COUNTERS};
pub use rendering::{
    Color, FrameStats, Framebuffer, Pipeline, Primitive, RasterBackend, SerialBackend,
    TiledBackend, Triangle, Vertex,
};
