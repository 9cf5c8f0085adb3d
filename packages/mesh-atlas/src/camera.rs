//! Viewport/camera provider contract.
//!
//! The pipeline asks a [`ViewportSource`] for the active 3D viewport each frame.
//! `None` means there is no active view and the frame is skipped.

use serde::{Deserialize, Serialize};

/// Everything the pipeline needs to know about the active 3D viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportInfo {
    pub width: u32,
    pub height: u32,
    /// Near clip plane distance.
    pub near: f32,
    /// Far clip plane distance.
    pub far: f32,
    pub view_proj: glam::Mat4,
}

impl ViewportInfo {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Supplies the active viewport, if any.
pub trait ViewportSource {
    fn active_viewport(&self) -> Option<ViewportInfo>;
}

/// Look-at perspective camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Camera {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: [4.0, 2.0, 4.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            fov: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> glam::Mat4 {
        glam::Mat4::look_at_rh(
            glam::Vec3::from(self.position),
            glam::Vec3::from(self.target),
            glam::Vec3::from(self.up),
        )
    }

    /// Projection with a [0, 1] depth range.
    pub fn projection_matrix(&self, aspect: f32) -> glam::Mat4 {
        glam::Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self, aspect: f32) -> glam::Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Build viewport info for a render target of the given size.
    pub fn viewport(&self, width: u32, height: u32) -> ViewportInfo {
        let aspect = width as f32 / height.max(1) as f32;
        ViewportInfo {
            width,
            height,
            near: self.near,
            far: self.far,
            view_proj: self.view_projection_matrix(aspect),
        }
    }
}

/// A camera bound to a fixed-size off-screen viewport.
#[derive(Debug, Clone, Copy)]
pub struct FixedViewport {
    pub camera: Camera,
    pub width: u32,
    pub height: u32,
}

impl ViewportSource for FixedViewport {
    fn active_viewport(&self) -> Option<ViewportInfo> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some(self.camera.viewport(self.width, self.height))
    }
}

/// Linear eye distance from a window-space depth value in [0, 1].
///
/// The window depth is first mapped to NDC `z = 2d - 1`, then inverted through
/// the perspective projection: `2nf / (f + n - z(f - n))`.
/// Mirrors `linearize_depth` in `identification.wgsl`.
pub fn linearize_depth(window_depth: f32, near: f32, far: f32) -> f32 {
    let ndc_z = 2.0 * window_depth - 1.0;
    (2.0 * near * far) / (far + near - ndc_z * (far - near))
}

/// Map a linear eye distance to [0, 1] between the clip planes.
pub fn normalize_depth(linear: f32, near: f32, far: f32) -> f32 {
    (linear - near) / (far - near)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_endpoints() {
        let (near, far) = (0.1, 100.0);
        assert!((linearize_depth(0.0, near, far) - near).abs() < 1e-5);
        assert!((linearize_depth(1.0, near, far) - far).abs() < 5e-2);
        assert!(normalize_depth(linearize_depth(0.0, near, far), near, far).abs() < 1e-6);
        assert!((normalize_depth(linearize_depth(1.0, near, far), near, far) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_depth_matches_projection() {
        // A point at eye distance 10 projected with perspective_rh must
        // linearize back to 10.
        let camera = Camera {
            position: [0.0, 0.0, 0.0],
            target: [0.0, 0.0, -1.0],
            near: 0.5,
            far: 50.0,
            ..Camera::default()
        };
        let clip = camera.view_projection_matrix(1.0) * glam::Vec4::new(0.0, 0.0, -10.0, 1.0);
        let window_depth = clip.z / clip.w;
        let linear = linearize_depth(window_depth, camera.near, camera.far);
        assert!((linear - 10.0).abs() < 1e-3, "got {}", linear);
    }

    #[test]
    fn test_fixed_viewport_without_area_is_inactive() {
        let viewport = FixedViewport { camera: Camera::default(), width: 0, height: 600 };
        assert!(viewport.active_viewport().is_none());

        let viewport = FixedViewport { camera: Camera::default(), width: 800, height: 600 };
        let info = viewport.active_viewport().unwrap();
        assert_eq!(info.size(), (800, 600));
        assert_eq!(info.near, 0.1);
    }
}
