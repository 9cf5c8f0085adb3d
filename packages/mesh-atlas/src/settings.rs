//! Per-object atlas settings.
//!
//! Each object carries an enabled flag and a requested render resolution.
//! The resolution is editable either as a raw pixel count or as a power-of-two
//! exponent; both representations are kept consistent on every write so the
//! pipeline only ever needs to read the pixel values.

use serde::{Deserialize, Serialize};

/// Smallest requested cell edge in pixels.
pub const MIN_RESOLUTION: u32 = 8;
/// Largest requested cell edge in pixels.
pub const MAX_RESOLUTION: u32 = 512;
/// Exponent bounds matching `MIN_RESOLUTION..=MAX_RESOLUTION`.
pub const MIN_RESOLUTION_POWER: u32 = 3;
pub const MAX_RESOLUTION_POWER: u32 = 9;

/// One dimension of a render resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionAxis {
    pixels: u32,
    power: u32,
    /// Whether an editor should present this axis as a power of two.
    pub snapping: bool,
}

impl ResolutionAxis {
    fn from_power(power: u32) -> Self {
        let mut axis = Self { pixels: 0, power: 0, snapping: true };
        axis.set_power(power);
        axis
    }

    pub fn pixels(&self) -> u32 {
        self.pixels
    }

    pub fn power(&self) -> u32 {
        self.power
    }

    /// Set the pixel value; the exponent becomes `floor(log2(pixels))`.
    pub fn set_pixels(&mut self, pixels: u32) {
        self.pixels = pixels.clamp(MIN_RESOLUTION, MAX_RESOLUTION);
        self.power = self.pixels.ilog2();
    }

    /// Set the exponent; the pixel value becomes `1 << power`.
    pub fn set_power(&mut self, power: u32) {
        self.power = power.clamp(MIN_RESOLUTION_POWER, MAX_RESOLUTION_POWER);
        self.pixels = 1 << self.power;
    }
}

/// Requested output resolution of an object's atlas cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderResolution {
    pub width: ResolutionAxis,
    pub height: ResolutionAxis,
}

impl Default for RenderResolution {
    fn default() -> Self {
        Self {
            width: ResolutionAxis::from_power(6),
            height: ResolutionAxis::from_power(7),
        }
    }
}

impl RenderResolution {
    pub fn from_pixels(width: u32, height: u32) -> Self {
        let mut resolution = Self::default();
        resolution.width.set_pixels(width);
        resolution.height.set_pixels(height);
        resolution
    }

    /// Resolved (width, height) in pixels.
    pub fn pixels(&self) -> (u32, u32) {
        (self.width.pixels(), self.height.pixels())
    }
}

/// Serialized form of a resolution: raw pixels, or exponents when `power` is set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub power: bool,
}

impl From<ResolutionSpec> for RenderResolution {
    fn from(spec: ResolutionSpec) -> Self {
        let mut resolution = RenderResolution::default();
        if spec.power {
            resolution.width.set_power(spec.width);
            resolution.height.set_power(spec.height);
        } else {
            resolution.width.set_pixels(spec.width);
            resolution.height.set_pixels(spec.height);
            resolution.width.snapping = false;
            resolution.height.snapping = false;
        }
        resolution
    }
}

/// Atlas settings attached to a scene object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSettings {
    enabled: bool,
    resolution: RenderResolution,
    /// Set on every change; cleared once a layout including the object was built.
    resolution_dirty: bool,
}

impl Default for ObjectSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            resolution: RenderResolution::default(),
            resolution_dirty: true,
        }
    }
}

impl ObjectSettings {
    pub fn new(enabled: bool, resolution: RenderResolution) -> Self {
        Self { enabled, resolution, resolution_dirty: true }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.resolution_dirty = true;
        }
    }

    pub fn resolution(&self) -> &RenderResolution {
        &self.resolution
    }

    pub fn set_width(&mut self, pixels: u32) {
        self.resolution.width.set_pixels(pixels);
        self.resolution_dirty = true;
    }

    pub fn set_height(&mut self, pixels: u32) {
        self.resolution.height.set_pixels(pixels);
        self.resolution_dirty = true;
    }

    pub fn set_width_power(&mut self, power: u32) {
        self.resolution.width.set_power(power);
        self.resolution_dirty = true;
    }

    pub fn set_height_power(&mut self, power: u32) {
        self.resolution.height.set_power(power);
        self.resolution_dirty = true;
    }

    pub fn is_resolution_dirty(&self) -> bool {
        self.resolution_dirty
    }

    pub fn clear_resolution_dirty(&mut self) {
        self.resolution_dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolution() {
        let resolution = RenderResolution::default();
        assert_eq!(resolution.pixels(), (64, 128));
        assert_eq!(resolution.width.power(), 6);
        assert_eq!(resolution.height.power(), 7);
    }

    #[test]
    fn test_pixels_update_power() {
        let mut axis = ResolutionAxis::from_power(3);
        axis.set_pixels(100);
        assert_eq!(axis.pixels(), 100);
        assert_eq!(axis.power(), 6);
    }

    #[test]
    fn test_power_updates_pixels() {
        let mut axis = ResolutionAxis::from_power(3);
        axis.set_power(8);
        assert_eq!(axis.pixels(), 256);
    }

    #[test]
    fn test_clamping() {
        let mut axis = ResolutionAxis::from_power(3);
        axis.set_pixels(2);
        assert_eq!(axis.pixels(), MIN_RESOLUTION);
        axis.set_pixels(4096);
        assert_eq!(axis.pixels(), MAX_RESOLUTION);
        axis.set_power(12);
        assert_eq!(axis.power(), MAX_RESOLUTION_POWER);
        assert_eq!(axis.pixels(), 512);
    }

    #[test]
    fn test_settings_dirty_tracking() {
        let mut settings = ObjectSettings::default();
        assert!(!settings.enabled());
        assert!(settings.is_resolution_dirty());

        settings.clear_resolution_dirty();
        settings.set_enabled(false);
        assert!(!settings.is_resolution_dirty());

        settings.set_width_power(5);
        assert!(settings.is_resolution_dirty());
        assert_eq!(settings.resolution().pixels(), (32, 128));
    }

    #[test]
    fn test_spec_conversion() {
        let pixels: RenderResolution = ResolutionSpec { width: 48, height: 200, power: false }.into();
        assert_eq!(pixels.pixels(), (48, 200));
        assert!(!pixels.width.snapping);

        let powers: RenderResolution = ResolutionSpec { width: 4, height: 9, power: true }.into();
        assert_eq!(powers.pixels(), (16, 512));
    }
}
