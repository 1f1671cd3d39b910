/// Camera - shared view state read by the render stages
///
/// The caller computes and sets view and projection; the engine computes
/// nothing from high-level parameters. Near/far/fov are carried alongside
/// because shadow cascade fitting slices the camera's depth range.

use std::sync::Mutex;

use glam::{Mat4, Vec3};

use super::frustum::Frustum;

/// Snapshot of the camera for one frame
#[derive(Debug, Clone, Copy)]
pub struct CameraState {
    /// View matrix (inverse of the camera's world transform)
    pub view: Mat4,
    /// Projection matrix (perspective or orthographic)
    pub projection: Mat4,
    /// World-space position
    pub position: Vec3,
    /// Near clipping distance
    pub near: f32,
    /// Far clipping distance
    pub far: f32,
    /// Vertical field of view in radians (perspective cameras)
    pub fov: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
            near: 0.1,
            far: 100.0,
            fov: std::f32::consts::FRAC_PI_4,
        }
    }
}

impl CameraState {
    /// Combined view-projection matrix (projection * view)
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Frustum planes for culling
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }
}

/// Camera shared between the caller and the render stages
pub struct Camera {
    pub id: u32,
    state: Mutex<CameraState>,
}

impl Camera {
    pub fn new(state: CameraState) -> Self {
        Self { id: super::resources::next_resource_id(), state: Mutex::new(state) }
    }

    pub fn state(&self) -> CameraState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: CameraState) {
        *self.state.lock().unwrap() = state;
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
