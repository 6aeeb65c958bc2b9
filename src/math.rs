// math.rs: orientation, projection and picking helpers. No state.

use crate::camera::{PerspectiveCamera, Viewport};
use glam::{EulerRot, Mat4, Quat, Vec2, Vec3, Vec4};
use std::f32::consts::{FRAC_PI_2, PI};

const MIN_POLAR_ANGLE: f32 = 0.0;
const MAX_POLAR_ANGLE: f32 = PI;

/// Turns a 2D drag (or auto-rotate) delta into a new camera orientation.
///
/// The orientation is decomposed as yaw-pitch-roll (YXZ), `delta.x` drives
/// yaw and `delta.y` drives pitch. Pitch is kept inside the polar range so the
/// view never flips over the poles.
pub fn rotate_by_axis_2d(delta: Vec2, orientation: Quat, speed: f32) -> Quat {
    let (mut yaw, mut pitch, roll) = orientation.to_euler(EulerRot::YXZ);

    yaw += delta.x * speed;
    pitch += delta.y * speed;
    pitch = pitch.clamp(FRAC_PI_2 - MAX_POLAR_ANGLE, FRAC_PI_2 - MIN_POLAR_ANGLE);

    Quat::from_euler(EulerRot::YXZ, yaw, pitch, roll)
}

pub fn position_equals(a: Vec3, b: Vec3) -> bool {
    a.x == b.x && a.y == b.y && a.z == b.z
}

pub fn distance_vector(a: Vec3, b: Vec3) -> f32 {
    (a - b).length()
}

/// Projects a world-space point to pixel coordinates, origin top-left.
///
/// Points behind the camera still produce a (mirrored) coordinate; callers
/// decide visibility with [`Frustum::contains_point`].
pub fn to_screen_position(world: Vec3, camera: &PerspectiveCamera, viewport: Viewport) -> Vec2 {
    let ndc = camera.view_projection().project_point3(world);
    let half_w = 0.5 * viewport.width;
    let half_h = 0.5 * viewport.height;
    Vec2::new(ndc.x * half_w + half_w, -(ndc.y * half_h) + half_h)
}

/// Visible volume of a camera, tested in clip space.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    view_projection: Mat4,
}

impl Frustum {
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        Self { view_projection }
    }

    pub fn from_camera(camera: &PerspectiveCamera) -> Self {
        Self::from_view_projection(camera.view_projection())
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        let clip = self.view_projection * point.extend(1.0);
        if clip.w <= 0.0 {
            return false;
        }
        // wgpu depth range: 0..w
        clip.x.abs() <= clip.w && clip.y.abs() <= clip.w && clip.z >= 0.0 && clip.z <= clip.w
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// World-space ray through a pixel of the viewport.
pub fn screen_to_world_ray(pointer: Vec2, viewport: Viewport, camera: &PerspectiveCamera) -> Ray {
    let ndc_x = (pointer.x / viewport.width) * 2.0 - 1.0;
    let ndc_y = -(pointer.y / viewport.height) * 2.0 + 1.0;

    let inv = camera.view_projection().inverse();
    let far = inv * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
    let far = far.truncate() / far.w;

    Ray {
        origin: camera.position,
        direction: (far - camera.position).normalize_or_zero(),
    }
}

/// Something the picking ray can hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Camera-facing quad, like a sprite.
    Billboard { center: Vec3, size: Vec2 },
    Sphere { center: Vec3, radius: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection<K> {
    pub key: K,
    pub distance: f32,
    pub point: Vec3,
}

/// Casts a ray from the pointer and returns every hit candidate, nearest first.
pub fn raycast_intersection<K: Copy>(
    pointer: Vec2,
    viewport: Viewport,
    camera: &PerspectiveCamera,
    candidates: &[(K, Shape)],
) -> Vec<Intersection<K>> {
    let ray = screen_to_world_ray(pointer, viewport, camera);
    let mut hits: Vec<Intersection<K>> = candidates
        .iter()
        .filter_map(|(key, shape)| {
            let t = match *shape {
                Shape::Billboard { center, size } => ray_billboard(&ray, camera, center, size),
                Shape::Sphere { center, radius } => ray_sphere(&ray, center, radius),
            }?;
            Some(Intersection {
                key: *key,
                distance: t,
                point: ray.at(t),
            })
        })
        .collect();

    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

/// Nearest non-negative hit; a ray starting inside the sphere hits the far side.
pub fn ray_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.direction);
    let c = oc.dot(oc) - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let near = -b - sq;
    if near >= 0.0 {
        return Some(near);
    }
    let far = -b + sq;
    (far >= 0.0).then_some(far)
}

fn ray_billboard(ray: &Ray, camera: &PerspectiveCamera, center: Vec3, size: Vec2) -> Option<f32> {
    let normal = -camera.forward();
    let denom = ray.direction.dot(normal);
    if denom.abs() < 1e-6 {
        return None;
    }
    let t = (center - ray.origin).dot(normal) / denom;
    if t < 0.0 {
        return None;
    }
    let local = ray.at(t) - center;
    let inside = local.dot(camera.right()).abs() <= size.x * 0.5
        && local.dot(camera.up()).abs() <= size.y * 0.5;
    inside.then_some(t)
}
