// camera.rs: perspective camera shared by the manager, the projector and the renderer

use glam::{Mat4, Quat, Vec3};

pub const DEFAULT_FOV: f32 = 75.0;
pub const MIN_FOV: f32 = 10.0;
pub const MAX_FOV: f32 = 120.0;

/// Output surface size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }

    /// Strictly inside the surface; points on the border count as outside.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x > 0.0 && x < self.width && y > 0.0 && y < self.height
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// Right-handed camera looking down -Z in its local frame.
///
/// `fov` is the vertical field of view in degrees, the same unit the zoom
/// controls work in.
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub orientation: Quat,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            fov,
            aspect,
            near,
            far,
        }
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    /// World to camera space.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position).inverse()
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    /// Adds `delta` degrees to the field of view and keeps it in range.
    pub fn zoom_by(&mut self, delta: f32) {
        self.fov = (self.fov + delta).clamp(MIN_FOV, MAX_FOV);
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(DEFAULT_FOV, 1.0, 0.1, 1000.0)
    }
}
