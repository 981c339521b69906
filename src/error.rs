/// Error types surfaced by the rendering pipeline
///
/// Only capacity, resource and I/O problems are errors. Degenerate geometry
/// is absorbed by the stages themselves and contributes zero coverage.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Triangle batch does not fit in the buffers allocated at construction.
    #[error("triangle batch of {requested} exceeds backend capacity of {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    /// Target framebuffer does not match the backend's allocation.
    #[error("framebuffer is {actual:?} but backend buffers were allocated for {expected:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("invalid render target dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("tile size must be non-zero, got {0}")]
    InvalidTileSize(usize),

    #[error("image export failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid render config: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_error_reports_both_sizes() {
        let err = RenderError::CapacityExceeded {
            requested: 12,
            capacity: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains('8'));
    }
}
