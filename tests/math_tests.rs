// Orientation, projection and picking helpers.

use glam::{EulerRot, Quat, Vec2, Vec3};
use panorama_tour::camera::{PerspectiveCamera, Viewport, MAX_FOV, MIN_FOV};
use panorama_tour::math::{
    ray_sphere, raycast_intersection, rotate_by_axis_2d, screen_to_world_ray, to_screen_position, Frustum, Ray,
    Shape,
};

const EPS: f32 = 1e-4;

fn camera_800x600() -> (PerspectiveCamera, Viewport) {
    let viewport = Viewport::new(800.0, 600.0);
    let mut camera = PerspectiveCamera::default();
    camera.aspect = viewport.aspect();
    (camera, viewport)
}

#[test]
fn zero_delta_keeps_orientation() {
    let q = Quat::from_euler(EulerRot::YXZ, 0.7, -0.3, 0.0);
    let r = rotate_by_axis_2d(Vec2::ZERO, q, 1.0);
    assert!(q.dot(r).abs() > 1.0 - EPS, "{q:?} vs {r:?}");
}

#[test]
fn horizontal_delta_drives_yaw() {
    let r = rotate_by_axis_2d(Vec2::new(1.0, 0.0), Quat::IDENTITY, 0.5);
    let (yaw, pitch, _) = r.to_euler(EulerRot::YXZ);
    assert!((yaw - 0.5).abs() < EPS);
    assert!(pitch.abs() < EPS);
}

#[test]
fn pitch_stops_at_the_poles() {
    let up = rotate_by_axis_2d(Vec2::new(0.0, 10.0), Quat::IDENTITY, 1.0);
    let forward = up * Vec3::NEG_Z;
    assert!(forward.y > 1.0 - 1e-3, "{forward:?}");

    let down = rotate_by_axis_2d(Vec2::new(0.0, -10.0), Quat::IDENTITY, 1.0);
    let forward = down * Vec3::NEG_Z;
    assert!(forward.y < -1.0 + 1e-3, "{forward:?}");

    // further drags past the pole change nothing
    let again = rotate_by_axis_2d(Vec2::new(0.0, 1.0), up, 1.0);
    assert!((again * Vec3::NEG_Z).y > 1.0 - 1e-3);
}

#[test]
fn point_ahead_projects_to_centre() {
    let (camera, viewport) = camera_800x600();
    let p = to_screen_position(Vec3::new(0.0, 0.0, -5.0), &camera, viewport);
    assert!((p.x - 400.0).abs() < EPS);
    assert!((p.y - 300.0).abs() < EPS);
}

#[test]
fn screen_y_grows_downwards() {
    let (camera, viewport) = camera_800x600();
    let above = to_screen_position(Vec3::new(0.0, 1.0, -5.0), &camera, viewport);
    let right = to_screen_position(Vec3::new(1.0, 0.0, -5.0), &camera, viewport);
    assert!(above.y < 300.0);
    assert!(right.x > 400.0);
}

#[test]
fn frustum_contains_only_what_is_in_front() {
    let (camera, _) = camera_800x600();
    let frustum = Frustum::from_camera(&camera);
    assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -5.0)));
    assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 5.0)));
    assert!(!frustum.contains_point(Vec3::new(-100.0, 0.0, -1.0)));
    // beyond the far plane
    assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -2000.0)));
}

#[test]
fn viewport_border_is_outside() {
    let viewport = Viewport::new(800.0, 600.0);
    assert!(viewport.contains(400.0, 300.0));
    assert!(!viewport.contains(0.0, 300.0));
    assert!(!viewport.contains(400.0, 600.0));
    assert!(!viewport.contains(-1.0, -1.0));
}

#[test]
fn centre_ray_points_forward() {
    let (camera, viewport) = camera_800x600();
    let ray = screen_to_world_ray(Vec2::new(400.0, 300.0), viewport, &camera);
    assert!(ray.direction.abs_diff_eq(Vec3::NEG_Z, EPS), "{:?}", ray.direction);
}

#[test]
fn ray_inside_sphere_hits_far_side() {
    let ray = Ray {
        origin: Vec3::ZERO,
        direction: Vec3::NEG_Z,
    };
    let t = ray_sphere(&ray, Vec3::ZERO, 5.0);
    assert!(t.is_some_and(|t| (t - 5.0).abs() < EPS));

    let miss = ray_sphere(&ray, Vec3::new(10.0, 0.0, 0.0), 1.0);
    assert!(miss.is_none());

    let behind = ray_sphere(&ray, Vec3::new(0.0, 0.0, 10.0), 1.0);
    assert!(behind.is_none());
}

#[test]
fn raycast_orders_nearest_first() {
    let (camera, viewport) = camera_800x600();
    let candidates = [
        (
            "far",
            Shape::Sphere {
                center: Vec3::new(0.0, 0.0, -10.0),
                radius: 1.0,
            },
        ),
        (
            "sprite",
            Shape::Billboard {
                center: Vec3::new(0.0, 0.0, -3.0),
                size: Vec2::new(1.0, 1.0),
            },
        ),
        (
            "aside",
            Shape::Sphere {
                center: Vec3::new(30.0, 0.0, -5.0),
                radius: 1.0,
            },
        ),
    ];

    let hits = raycast_intersection(Vec2::new(400.0, 300.0), viewport, &camera, &candidates);
    let keys: Vec<&str> = hits.iter().map(|h| h.key).collect();
    assert_eq!(keys, vec!["sprite", "far"]);
    assert!((hits[0].distance - 3.0).abs() < EPS);
    assert!((hits[1].distance - 9.0).abs() < EPS);
}

#[test]
fn zoom_is_clamped() {
    let mut camera = PerspectiveCamera::default();
    camera.zoom_by(500.0);
    assert_eq!(camera.fov, MAX_FOV);
    camera.zoom_by(-500.0);
    assert_eq!(camera.fov, MIN_FOV);
}
