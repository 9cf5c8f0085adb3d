//! Pipeline configuration.
//!
//! Fixed-size resources (atlas texture, accumulator, cell table) are sized from
//! this struct when the pipeline is created. It can be loaded from a camelCase
//! JSON file; every field has a default.

use serde::{Deserialize, Serialize};

/// Largest atlas edge accepted (matches the default wgpu 2D texture limit).
pub const MAX_ATLAS_DIMENSION: u32 = 8192;

fn default_atlas_width() -> u32 {
    1024
}

fn default_atlas_height() -> u32 {
    1024
}

/// Default CellViewport table size. Slot 0 is reserved for "no object".
fn default_cell_capacity() -> u32 {
    256
}

fn default_reject_oversized() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Atlas width in pixels.
    #[serde(default = "default_atlas_width")]
    pub atlas_width: u32,

    /// Atlas height in pixels.
    #[serde(default = "default_atlas_height")]
    pub atlas_height: u32,

    /// Number of CellViewport slots, indexed by object id.
    #[serde(default = "default_cell_capacity")]
    pub cell_capacity: u32,

    /// Background of the viewport colour capture.
    #[serde(default)]
    pub clear_color: [f32; 4],

    /// Drop objects whose requested cell is larger than the atlas instead of
    /// letting them overflow it.
    #[serde(default = "default_reject_oversized")]
    pub reject_oversized: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            atlas_width: default_atlas_width(),
            atlas_height: default_atlas_height(),
            cell_capacity: default_cell_capacity(),
            clear_color: [0.0; 4],
            reject_oversized: default_reject_oversized(),
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {:?}: {}", path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {:?}: {}", path, e))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.atlas_width == 0 || self.atlas_height == 0 {
            return Err("Atlas width and height must be positive".to_string());
        }
        if self.atlas_width > MAX_ATLAS_DIMENSION || self.atlas_height > MAX_ATLAS_DIMENSION {
            return Err(format!(
                "Atlas dimensions {}x{} exceed the {} pixel limit",
                self.atlas_width, self.atlas_height, MAX_ATLAS_DIMENSION
            ));
        }
        if self.cell_capacity < 2 {
            return Err("Cell capacity must be at least 2 (slot 0 is reserved)".to_string());
        }
        Ok(())
    }

    /// Number of atlas pixels.
    pub fn atlas_pixels(&self) -> usize {
        self.atlas_width as usize * self.atlas_height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_camel_case_fields() {
        let json = r#"{ "atlasWidth": 256, "atlasHeight": 512, "cellCapacity": 16 }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.atlas_width, 256);
        assert_eq!(config.atlas_height, 512);
        assert_eq!(config.cell_capacity, 16);
        assert!(config.reject_oversized);
        assert_eq!(config.atlas_pixels(), 256 * 512);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.atlas_width = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.atlas_height = MAX_ATLAS_DIMENSION + 1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.cell_capacity = 1;
        assert!(config.validate().is_err());
    }
}
