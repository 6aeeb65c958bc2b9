// projector.rs: world to screen projection behind a trait

use crate::camera::{PerspectiveCamera, Viewport};
use crate::math::{to_screen_position, Frustum};
use glam::{Vec2, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub screen: Vec2,
    pub in_frustum: bool,
}

impl Projection {
    /// Inside the camera volume and strictly inside the viewport.
    pub fn on_screen(&self, viewport: Viewport) -> bool {
        self.in_frustum && viewport.contains(self.screen.x, self.screen.y)
    }
}

/// Maps world points to screen points for label placement.
pub trait Projector {
    fn viewport(&self) -> Viewport;
    fn project(&self, world: Vec3) -> Projection;
}

pub struct CameraProjector<'a> {
    camera: &'a PerspectiveCamera,
    viewport: Viewport,
    frustum: Frustum,
}

impl<'a> CameraProjector<'a> {
    pub fn new(camera: &'a PerspectiveCamera, viewport: Viewport) -> Self {
        Self {
            camera,
            viewport,
            frustum: Frustum::from_camera(camera),
        }
    }
}

impl Projector for CameraProjector<'_> {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn project(&self, world: Vec3) -> Projection {
        Projection {
            screen: to_screen_position(world, self.camera, self.viewport),
            in_frustum: self.frustum.contains_point(world),
        }
    }
}
