/// Software rasterization pipeline
///
/// World triangles -> vertex stage -> clipper -> backend (serial scan or
/// tile-binned per-pixel) -> depth test -> framebuffer.
pub mod backend;
pub mod clipper;
pub mod fragment;
pub mod framebuffer;
pub mod pipeline;
pub mod rasterizer;
pub mod tile_binner;
pub mod tiled;
pub mod types;
pub mod vertex_stage;

pub use backend::{RasterBackend, SerialBackend};
pub use clipper::{ClipPlane, Polygon};
pub use framebuffer::{FrameSlice, Framebuffer};
pub use pipeline::Pipeline;
pub use rasterizer::{rasterize_triangle, BoundingBox, PixelTarget, TriangleSetup};
pub use tile_binner::{TileGrid, TileIndex};
pub use tiled::{DeviceBuffers, TiledBackend};
pub use types::{Color, Fragment, FrameStats, Primitive, ScreenTriangle, Triangle, Vertex};
pub use vertex_stage::{VertexStage, VertexStageSettings};
