/// Renderer configuration
/// Every field has a default so partial JSON files are accepted.
use crate::error::Result;
use crate::rendering::types::Color;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which rasterization backend drives the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// One triangle at a time, exclusive framebuffer access.
    Serial,
    /// Tile-binned, one logical worker per pixel.
    Tiled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: usize,
    pub height: usize,
    /// Edge length of a binning tile in pixels
    pub tile_size: usize,
    /// Capacity of the tiled backend's triangle buffers
    pub max_triangles: usize,
    pub clear_color: Color,
    /// Clip-space tolerance for the vertex-stage near-plane pre-cull
    pub near_epsilon: f32,
    pub backface_culling: bool,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub backend: BackendKind,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            tile_size: 16,
            max_triangles: 65_536,
            clear_color: Color::new(150, 150, 150),
            near_epsilon: 1e-3,
            backface_culling: false,
            fov_y_degrees: 70.0,
            near: 0.1,
            far: 1000.0,
            backend: BackendKind::Tiled,
        }
    }
}

impl RenderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RenderConfig::from_json_str(r#"{ "width": 512, "tile_size": 32 }"#).unwrap();
        assert_eq!(config.width, 512);
        assert_eq!(config.tile_size, 32);
        assert_eq!(config.height, 720);
        assert_eq!(config.backend, BackendKind::Tiled);
        assert_eq!(config.clear_color, Color::new(150, 150, 150));
    }

    #[test]
    fn backend_and_color_parse() {
        let config = RenderConfig::from_json_str(
            r#"{ "backend": "Serial", "clear_color": { "r": 1, "g": 2, "b": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Serial);
        assert_eq!(config.clear_color, Color::new(1, 2, 3));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = RenderConfig::from_json_str("{ width: }").unwrap_err();
        assert!(matches!(err, crate::error::RenderError::Config(_)));
    }
}
