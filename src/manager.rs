// manager.rs: scene/camera state of one viewer instance
//
// Owns the scene graph, the camera, the list of tour stops and their meshes,
// the overlay labels and the navigation transition. Time only enters through
// `advance`/`frame`, every other operation uses the last clock value seen.

use crate::camera::{PerspectiveCamera, Viewport};
use crate::config::{Marker, TourStop, ViewerSettings, DEFAULT_MARKER_SPRITE, DEFAULT_POINT_MARKER_SPRITE};
use crate::events::{EventBus, ON_LABELS_CHANGE};
use crate::labels::{marker_label_id, point_label_id, Label, LabelSurface};
use crate::math::{distance_vector, raycast_intersection, rotate_by_axis_2d, Intersection, Shape};
use crate::projector::{CameraProjector, Projection, Projector};
use crate::scene::{Node, NodeId, NodeKind, NodeTag, Scene, PARKED_POSITION};
use crate::schedule::{Deferred, Timeline};
use crate::tween::{Easing, SphereState, Tween};
use glam::{EulerRot, Quat, Vec2, Vec3};
use std::time::{Duration, Instant};

pub const SPHERE_RADIUS: f32 = 5.0;
/// Floor for camera distances used as divisors.
pub const MIN_RENDER_DISTANCE: f32 = 0.0001;
pub const POINT_MARKER_SPRITE_SIZE: f32 = 35.0;
pub const MARKER_SPRITE_SIZE: f32 = 40.0;

const DEFAULT_POINT_MARKER_SCALE: f32 = 0.2;
const DEFAULT_MARKER_SCALE: f32 = 0.15;
const FALLBACK_MARKER_LABEL_WIDTH: f32 = 100.0;
const DRAG_STEP: f32 = 0.001;
const LINE_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

const LABEL_REVEAL_DELAY: Duration = Duration::from_millis(100);
const LABEL_RETRY_DELAY: Duration = Duration::from_millis(100);
const COMMIT_DELAY: Duration = Duration::from_millis(100);
const AUTO_ROTATE_RESUME_DELAY: Duration = Duration::from_millis(1000);

/// Scene nodes owned by one tour stop. Only the active stop has markers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointMesh {
    pub sphere: Option<NodeId>,
    pub point_marker: Option<NodeId>,
    pub markers: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct PointEntry {
    stop: TourStop,
    mesh: PointMesh,
}

/// Payload of [`ON_LABELS_CHANGE`]: the current marker labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelsChanged {
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    PointMarker(usize),
    Marker(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    Idle,
    Animating,
    Completing,
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Idle,
    Animating {
        from: usize,
        to: usize,
        outgoing: Tween<SphereState>,
        incoming: Tween<SphereState>,
        camera: Tween<Vec3>,
    },
    Completing {
        to: usize,
        due: Instant,
    },
}

pub struct ViewerManager<S: LabelSurface> {
    scene: Scene,
    camera: PerspectiveCamera,
    viewport: Viewport,
    points: Vec<PointEntry>,
    point_labels: Vec<Label>,
    marker_labels: Vec<Label>,
    active_index: usize,
    transition: Transition,
    timeline: Timeline,
    events: EventBus<LabelsChanged>,
    surface: S,
    now: Instant,
    drawing: bool,
    auto_rotate_enabled: bool,
    should_auto_rotate: bool,
    auto_rotate_speed: f32,
    point_marker_sprite: String,
    marker_sprite: String,
    point_marker_sprite_scale: Option<f32>,
    marker_sprite_scale: Option<f32>,
    pub point_marker_sprite_size: f32,
    pub marker_sprite_size: f32,
    sphere_radius: f32,
}

impl<S: LabelSurface> ViewerManager<S> {
    pub fn new(surface: S, now: Instant) -> Self {
        Self {
            scene: Scene::new(),
            camera: PerspectiveCamera::default(),
            viewport: Viewport::default(),
            points: Vec::new(),
            point_labels: Vec::new(),
            marker_labels: Vec::new(),
            active_index: 0,
            transition: Transition::Idle,
            timeline: Timeline::new(),
            events: EventBus::new(),
            surface,
            now,
            drawing: false,
            auto_rotate_enabled: false,
            should_auto_rotate: false,
            auto_rotate_speed: 1.0,
            point_marker_sprite: DEFAULT_POINT_MARKER_SPRITE.to_string(),
            marker_sprite: DEFAULT_MARKER_SPRITE.to_string(),
            point_marker_sprite_scale: None,
            marker_sprite_scale: None,
            point_marker_sprite_size: POINT_MARKER_SPRITE_SIZE,
            marker_sprite_size: MARKER_SPRITE_SIZE,
            sphere_radius: SPHERE_RADIUS,
        }
    }

    /// Applies the viewer part of a tour's settings. Positions are set
    /// separately with [`set_points`](Self::set_points).
    pub fn apply_settings(&mut self, settings: &ViewerSettings) {
        self.set_auto_rotate(settings.auto_rotate, settings.auto_rotate_speed);
        self.set_point_marker_sprite_scale(settings.point_marker_sprite_scale);
        self.set_marker_sprite_scale(settings.marker_sprite_scale);
        self.set_point_marker_sprite(&settings.point_marker_sprite);
        self.set_marker_sprite(&settings.marker_sprite);
        if let Some(rotation) = settings.initial_camera_rotation {
            self.set_initial_rotation(rotation);
        }
    }

    // ---------------- accessors ----------------

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn fov(&self) -> f32 {
        self.camera.fov
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn stop(&self, index: usize) -> Option<&TourStop> {
        self.points.get(index).map(|e| &e.stop)
    }

    pub fn point_mesh(&self, index: usize) -> Option<&PointMesh> {
        self.points.get(index).map(|e| &e.mesh)
    }

    /// Point labels first, then marker labels.
    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.point_labels.iter().chain(self.marker_labels.iter())
    }

    pub fn point_labels(&self) -> &[Label] {
        &self.point_labels
    }

    pub fn marker_labels(&self) -> &[Label] {
        &self.marker_labels
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn events_mut(&mut self) -> &mut EventBus<LabelsChanged> {
        &mut self.events
    }

    pub fn is_navigating(&self) -> bool {
        !matches!(self.transition, Transition::Idle)
    }

    pub fn transition_phase(&self) -> TransitionPhase {
        match self.transition {
            Transition::Idle => TransitionPhase::Idle,
            Transition::Animating { .. } => TransitionPhase::Animating,
            Transition::Completing { .. } => TransitionPhase::Completing,
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn should_auto_rotate(&self) -> bool {
        self.should_auto_rotate
    }

    pub fn point_marker_sprite(&self) -> &str {
        &self.point_marker_sprite
    }

    pub fn marker_sprite(&self) -> &str {
        &self.marker_sprite
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    // ---------------- clock and render loop ----------------

    pub fn start_drawing(&mut self) {
        self.drawing = true;
    }

    pub fn stop_drawing(&mut self) {
        self.drawing = false;
    }

    /// Per-frame callback. Returns whether the host should schedule another
    /// frame; once [`stop_drawing`](Self::stop_drawing) was called it returns
    /// `false` without touching any state.
    pub fn frame(&mut self, now: Instant) -> bool {
        if !self.drawing {
            return false;
        }
        self.now = self.now.max(now);
        if self.should_auto_rotate {
            self.camera.orientation = rotate_by_axis_2d(
                Vec2::X,
                self.camera.orientation,
                DRAG_STEP * self.auto_rotate_speed,
            );
            self.update_point_marker_label_positions();
            self.update_marker_label_positions();
        }
        self.advance(now);
        true
    }

    /// Moves the clock forward: steps the running transition and fires due
    /// deferred tasks.
    pub fn advance(&mut self, now: Instant) {
        self.now = self.now.max(now);
        self.step_transition();
        for task in self.timeline.take_due(self.now) {
            self.run_deferred(task);
        }
    }

    fn run_deferred(&mut self, task: Deferred) {
        match task {
            Deferred::RevealLabel(id) => {
                if self.surface.is_mounted(&id) {
                    self.surface.set_displayed(&id, true);
                }
            }
            Deferred::RetryPointLabels => self.update_point_marker_label_positions(),
            Deferred::RetryMarkerLabels => self.update_marker_label_positions(),
            Deferred::ResumeAutoRotate => self.should_auto_rotate = self.auto_rotate_enabled,
        }
    }

    // ---------------- camera ----------------

    pub fn set_size(&mut self, width: f32, height: f32) {
        if width <= 0.0 || height <= 0.0 {
            log::debug!("ignoring empty viewport {width}x{height}");
            return;
        }
        self.viewport = Viewport::new(width, height);
        self.camera.aspect = self.viewport.aspect();
    }

    /// Zooms by `delta` degrees, keeping the field of view in [10, 120].
    pub fn set_fov_delta(&mut self, delta: f32) {
        self.camera.zoom_by(delta);
        self.update_point_marker_label_positions();
        self.update_marker_label_positions();
    }

    pub fn move_camera_2d_delta(&mut self, delta: Vec2, speed: f32) {
        self.camera.orientation = rotate_by_axis_2d(delta, self.camera.orientation, speed * DRAG_STEP);
        self.update_point_marker_label_positions();
        self.update_marker_label_positions();
    }

    /// XYZ Euler angles in radians.
    pub fn set_initial_rotation(&mut self, radians: [f32; 3]) {
        let [x, y, z] = radians;
        self.camera.orientation = Quat::from_euler(EulerRot::XYZ, x, y, z);
    }

    pub fn set_auto_rotate(&mut self, enabled: bool, speed: f32) {
        self.auto_rotate_enabled = enabled;
        self.should_auto_rotate = enabled;
        self.auto_rotate_speed = speed;
    }

    /// User input started: stop rotating and forget any pending resume.
    pub fn pause_auto_rotate(&mut self) {
        self.timeline.cancel(&Deferred::ResumeAutoRotate);
        self.should_auto_rotate = false;
    }

    /// User input ended: resume auto-rotation after a quiet second.
    pub fn resume_auto_rotate_later(&mut self) {
        self.timeline
            .debounce(self.now + AUTO_ROTATE_RESUME_DELAY, Deferred::ResumeAutoRotate);
    }

    // ---------------- sprites ----------------

    pub fn set_point_marker_sprite(&mut self, sprite: &str) {
        if self.point_marker_sprite == sprite {
            return;
        }
        self.point_marker_sprite = sprite.to_string();
        for index in 0..self.points.len() {
            self.refresh_point_marker(index);
        }
    }

    pub fn set_marker_sprite(&mut self, sprite: &str) {
        if self.marker_sprite == sprite {
            return;
        }
        self.marker_sprite = sprite.to_string();
        self.reset_active_markers();
    }

    pub fn set_point_marker_sprite_scale(&mut self, scale: Option<f32>) {
        if self.point_marker_sprite_scale == scale {
            return;
        }
        self.point_marker_sprite_scale = scale;
        for index in 0..self.points.len() {
            self.refresh_point_marker(index);
        }
    }

    pub fn set_marker_sprite_scale(&mut self, scale: Option<f32>) {
        if self.marker_sprite_scale == scale {
            return;
        }
        self.marker_sprite_scale = scale;
        self.reset_active_markers();
    }

    fn reset_active_markers(&mut self) {
        let markers = self
            .points
            .get(self.active_index)
            .map(|e| e.stop.markers.clone())
            .unwrap_or_default();
        self.set_markers(&markers);
    }

    fn point_marker_look(&self, stop: &TourStop) -> (String, f32) {
        let texture = stop
            .sprite
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.point_marker_sprite.clone());
        let scale = stop
            .sprite_scale
            .or(self.point_marker_sprite_scale)
            .unwrap_or(DEFAULT_POINT_MARKER_SCALE);
        (texture, scale)
    }

    /// Re-applies icon and scale to an existing point marker, keeping the node.
    fn refresh_point_marker(&mut self, index: usize) {
        let Some(entry) = self.points.get(index) else {
            return;
        };
        let (texture, scale) = self.point_marker_look(&entry.stop);
        let Some(node) = entry.mesh.point_marker.and_then(|id| self.scene.get_mut(id)) else {
            return;
        };
        node.kind = NodeKind::Sprite { texture };
        node.scale = Vec3::new(scale, scale, 1.0);
    }

    // ---------------- positions ----------------

    /// Reconciles the stops with `stops`. Stops showing the same panorama
    /// (same image, same anchor) keep their scene nodes; the list takes the
    /// order of `stops` and the view snaps to the active stop without
    /// animation.
    pub fn set_points(&mut self, stops: Vec<TourStop>) {
        let active_stop = self.points.get(self.active_index).map(|e| e.stop.clone());
        if self.is_navigating() {
            log::debug!("set_points dropped an in-flight transition");
            self.transition = Transition::Idle;
        }

        // point label ids follow indices, which are about to change
        self.timeline.cancel_where(|t| match t {
            Deferred::RevealLabel(id) => id.starts_with("360_point_marker_label_"),
            Deferred::RetryPointLabels => true,
            _ => false,
        });

        let mut previous: Vec<Option<PointEntry>> = std::mem::take(&mut self.points)
            .into_iter()
            .map(Some)
            .collect();

        // drop stops that are gone before building the new list
        for slot in previous.iter_mut() {
            let gone = slot
                .as_ref()
                .is_some_and(|e| !stops.iter().any(|s| s.same_panorama(&e.stop)));
            if gone {
                if let Some(entry) = slot.take() {
                    self.remove_entry(&entry);
                }
            }
        }

        let mut next = Vec::with_capacity(stops.len());
        for (index, stop) in stops.into_iter().enumerate() {
            let slot = previous
                .iter()
                .position(|slot| slot.as_ref().is_some_and(|e| e.stop.same_panorama(&stop)));
            let entry = match slot.and_then(|i| previous[i].take()) {
                Some(entry) => self.update_entry(entry, index, stop),
                None => self.create_entry(index, stop),
            };
            next.push(entry);
        }
        // duplicates of a stop that appear fewer times now
        for entry in previous.into_iter().flatten() {
            self.remove_entry(&entry);
        }
        self.points = next;

        self.point_labels = self
            .points
            .iter()
            .enumerate()
            .map(|(i, e)| Label::point(i, e.stop.label.clone(), self.point_marker_sprite_size))
            .collect();

        if self.points.is_empty() {
            self.active_index = 0;
            self.set_markers(&[]);
            return;
        }

        self.active_index = active_stop
            .and_then(|s| self.points.iter().position(|e| e.stop.same_panorama(&s)))
            .unwrap_or(self.active_index.min(self.points.len() - 1));

        self.snap_to(self.active_index);
        self.update_marker_label_positions();
    }

    fn create_entry(&mut self, index: usize, stop: TourStop) -> PointEntry {
        let (texture, scale) = self.point_marker_look(&stop);
        let point_marker = self.scene.add(
            Node::new(NodeTag::PointMarker { index }, NodeKind::Sprite { texture })
                .with_position(stop.point)
                .with_sprite_scale(scale),
        );

        let mut sphere = Node::new(
            NodeTag::ImageSphere { index },
            NodeKind::Sphere {
                radius: self.sphere_radius,
                texture: stop.img.clone(),
            },
        )
        .with_position(PARKED_POSITION);
        sphere.opacity = 0.0;
        let sphere = self.scene.add(sphere);

        log::debug!("added position {index} ({})", stop.img);
        PointEntry {
            stop,
            mesh: PointMesh {
                sphere: Some(sphere),
                point_marker: Some(point_marker),
                markers: Vec::new(),
            },
        }
    }

    fn update_entry(&mut self, mut entry: PointEntry, index: usize, stop: TourStop) -> PointEntry {
        for id in [entry.mesh.sphere, entry.mesh.point_marker].into_iter().flatten() {
            if let Some(node) = self.scene.get_mut(id) {
                node.tag = node.tag.with_index(index);
            }
        }
        let (texture, scale) = self.point_marker_look(&stop);
        if let Some(node) = entry.mesh.point_marker.and_then(|id| self.scene.get_mut(id)) {
            node.kind = NodeKind::Sprite { texture };
            node.scale = Vec3::new(scale, scale, 1.0);
        }
        entry.stop = stop;
        entry
    }

    fn remove_entry(&mut self, entry: &PointEntry) {
        let ids = [entry.mesh.sphere, entry.mesh.point_marker];
        for id in ids.into_iter().flatten().chain(entry.mesh.markers.iter().copied()) {
            if let Some(node) = self.scene.remove(id) {
                log::trace!("dropped {}", node.tag);
            }
        }
        log::debug!("removed position {}", entry.stop.img);
    }

    // ---------------- navigation ----------------

    /// Travels to stop `index`. Returns `false` when the request was ignored:
    /// unknown index, or another transition still running.
    pub fn move_to_point_by_index(&mut self, index: usize, duration: Duration) -> bool {
        if self.is_navigating() {
            log::debug!("navigation to {index} ignored, transition in flight");
            return false;
        }
        let Some(target) = self.points.get(index).map(|e| e.stop.point) else {
            log::debug!("navigation to {index} ignored, no such position");
            return false;
        };

        self.hide_point_markers();

        if duration.is_zero() || index == self.active_index {
            self.snap_to(index);
            return true;
        }

        let origin = self.camera.position;
        let distance = distance_vector(target, origin);
        let delta = target - origin;
        let now = self.now;

        let outgoing = Tween::new(
            SphereState {
                opacity: 1.0,
                position: origin,
                scale: 1.0,
            },
            SphereState {
                opacity: 0.2,
                position: origin - delta * 4.0,
                scale: distance,
            },
            now,
            duration,
        );
        let incoming = Tween::new(
            SphereState {
                opacity: 0.3,
                position: target + delta * 2.0,
                scale: distance,
            },
            SphereState {
                opacity: 1.0,
                position: target,
                scale: 1.0,
            },
            now,
            duration,
        );
        let camera = Tween::new(origin, target, now, duration).with_easing(Easing::QuadraticOut);

        log::info!("navigating {} -> {index} over {duration:?}", self.active_index);
        self.transition = Transition::Animating {
            from: self.active_index,
            to: index,
            outgoing,
            incoming,
            camera,
        };
        self.step_transition();
        true
    }

    fn hide_point_markers(&mut self) {
        for (index, entry) in self.points.iter().enumerate() {
            if let Some(node) = entry.mesh.point_marker.and_then(|id| self.scene.get_mut(id)) {
                node.visible = false;
            }
            let id = point_label_id(index);
            self.timeline.cancel(&Deferred::RevealLabel(id.clone()));
            if self.surface.is_mounted(&id) {
                self.surface.set_displayed(&id, false);
            }
        }
    }

    fn set_sphere(&mut self, index: usize, state: SphereState) {
        let Some(node) = self
            .points
            .get(index)
            .and_then(|e| e.mesh.sphere)
            .and_then(|id| self.scene.get_mut(id))
        else {
            return;
        };
        node.opacity = state.opacity;
        node.position = state.position;
        node.scale = Vec3::splat(state.scale);
    }

    fn park_sphere(&mut self, index: usize) {
        self.set_sphere(
            index,
            SphereState {
                opacity: 0.0,
                position: PARKED_POSITION,
                scale: 1.0,
            },
        );
    }

    fn step_transition(&mut self) {
        let now = self.now;
        loop {
            match self.transition {
                Transition::Idle => return,
                Transition::Animating {
                    from,
                    to,
                    outgoing,
                    incoming,
                    camera,
                } => {
                    self.set_sphere(from, outgoing.value_at(now));
                    self.set_sphere(to, incoming.value_at(now));
                    self.camera.position = camera.value_at(now);
                    if !outgoing.is_finished(now) {
                        return;
                    }
                    self.park_sphere(from);
                    log::debug!("transition to {to} finished animating");
                    self.transition = Transition::Completing {
                        to,
                        due: outgoing.started + outgoing.duration + COMMIT_DELAY,
                    };
                }
                Transition::Completing { to, due } => {
                    if now < due {
                        return;
                    }
                    self.commit(to);
                }
            }
        }
    }

    /// End state of a navigation, applied without animation.
    fn snap_to(&mut self, index: usize) {
        let Some(anchor) = self.points.get(index).map(|e| e.stop.point) else {
            return;
        };
        for i in 0..self.points.len() {
            if i == index {
                self.set_sphere(
                    i,
                    SphereState {
                        opacity: 1.0,
                        position: anchor,
                        scale: 1.0,
                    },
                );
            } else {
                self.park_sphere(i);
            }
        }
        self.camera.position = anchor;
        self.commit(index);
    }

    fn commit(&mut self, index: usize) {
        self.transition = Transition::Idle;
        let Some(anchor) = self.points.get(index).map(|e| e.stop.point) else {
            return;
        };

        // navigation sprites go on a shell around the camera
        let eye = self.camera.position;
        for (i, entry) in self.points.iter().enumerate() {
            let Some(node) = entry.mesh.point_marker.and_then(|id| self.scene.get_mut(id)) else {
                continue;
            };
            if i == index {
                node.visible = false;
                continue;
            }
            let distance = distance_vector(eye, entry.stop.point).max(MIN_RENDER_DISTANCE);
            let k = self.sphere_radius * 0.9 / distance;
            node.position = anchor + (entry.stop.point - anchor) * k;
            node.visible = true;
        }

        self.active_index = index;
        let markers = self.points[index].stop.markers.clone();
        self.set_markers(&markers);
        self.update_point_marker_label_positions();
        log::info!("position {index} active");
    }

    // ---------------- markers ----------------

    fn clear_markers(&mut self) {
        self.scene.remove_where(|n| n.tag.is_marker_content());
        for entry in &mut self.points {
            entry.mesh.markers.clear();
        }
        self.marker_labels.clear();
        self.timeline.cancel_where(|t| match t {
            Deferred::RevealLabel(id) => id.starts_with("360_marker_label_"),
            Deferred::RetryMarkerLabels => true,
            _ => false,
        });
    }

    /// Replaces the markers of the active stop. Markers are placed relative
    /// to the camera so they stay with the panorama being looked at.
    pub fn set_markers(&mut self, markers: &[Marker]) {
        self.clear_markers();

        if self.points.get(self.active_index).is_some() {
            let origin = self.camera.position;
            for (index, marker) in markers.iter().enumerate() {
                if let Some(to) = marker.line_to {
                    self.scene.add(Node::new(
                        NodeTag::MarkerLine { index },
                        NodeKind::Line {
                            from: origin + marker.point,
                            to: origin + to,
                            color: LINE_COLOR,
                        },
                    ));
                }

                let texture = marker
                    .sprite
                    .clone()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| self.marker_sprite.clone());
                let scale = marker
                    .sprite_scale
                    .or(self.marker_sprite_scale)
                    .unwrap_or(DEFAULT_MARKER_SCALE);
                let id = self.scene.add(
                    Node::new(NodeTag::Marker { index }, NodeKind::Sprite { texture })
                        .with_position(origin + marker.point)
                        .with_sprite_scale(scale),
                );
                self.points[self.active_index].mesh.markers.push(id);
                self.marker_labels
                    .push(Label::marker(index, marker.content.clone(), self.marker_sprite_size));
            }
        }

        let payload = LabelsChanged {
            labels: self.marker_labels.clone(),
        };
        if let Err(err) = self.events.dispatch(ON_LABELS_CHANGE, &payload) {
            log::error!("labels listener failed: {err:#}");
        }
        self.update_marker_label_positions();
    }

    // ---------------- labels ----------------

    pub fn update_point_marker_label_positions(&mut self) {
        let projector = CameraProjector::new(&self.camera, self.viewport);
        let mut missing_width = false;

        for (index, entry) in self.points.iter().enumerate() {
            let id = point_label_id(index);
            if !self.surface.is_mounted(&id) {
                continue;
            }
            if index == self.active_index {
                self.timeline.cancel(&Deferred::RevealLabel(id.clone()));
                self.surface.set_displayed(&id, false);
                continue;
            }
            let Some(node) = entry.mesh.point_marker.and_then(|nid| self.scene.get_mut(nid)) else {
                continue;
            };
            let projection = if node.visible {
                projector.project(node.position)
            } else {
                Projection {
                    screen: Vec2::splat(-1.0),
                    in_frustum: false,
                }
            };
            missing_width |= place_label(
                &mut self.surface,
                &mut self.timeline,
                self.now,
                projection,
                projector.viewport(),
                &id,
                &mut node.label_width,
                0.0,
                self.point_marker_sprite_size,
            );
        }

        if missing_width {
            self.timeline
                .schedule_once(self.now + LABEL_RETRY_DELAY, Deferred::RetryPointLabels);
        }
    }

    pub fn update_marker_label_positions(&mut self) {
        let Some(entry) = self.points.get(self.active_index) else {
            return;
        };
        let projector = CameraProjector::new(&self.camera, self.viewport);
        let mut missing_width = false;

        for (index, node_id) in entry.mesh.markers.iter().enumerate() {
            let id = marker_label_id(index);
            if !self.surface.is_mounted(&id) {
                continue;
            }
            let Some(node) = self.scene.get_mut(*node_id) else {
                continue;
            };
            missing_width |= place_label(
                &mut self.surface,
                &mut self.timeline,
                self.now,
                projector.project(node.position),
                projector.viewport(),
                &id,
                &mut node.label_width,
                FALLBACK_MARKER_LABEL_WIDTH,
                self.marker_sprite_size,
            );
        }

        if missing_width {
            self.timeline
                .schedule_once(self.now + LABEL_RETRY_DELAY, Deferred::RetryMarkerLabels);
        }
    }

    // ---------------- picking ----------------

    /// Everything under the pointer, nearest first.
    pub fn raycast(&self, pointer: Vec2) -> Vec<Intersection<NodeId>> {
        let candidates: Vec<(NodeId, Shape)> = self
            .scene
            .iter()
            .filter(|(_, n)| n.visible && n.opacity > 0.0)
            .filter_map(|(id, n)| match &n.kind {
                NodeKind::Sprite { .. } => Some((
                    id,
                    Shape::Billboard {
                        center: n.position,
                        size: n.sprite_size(),
                    },
                )),
                NodeKind::Sphere { radius, .. } => Some((
                    id,
                    Shape::Sphere {
                        center: n.position,
                        radius: radius * n.scale.x,
                    },
                )),
                NodeKind::Line { .. } => None,
            })
            .collect();
        raycast_intersection(pointer, self.viewport, &self.camera, &candidates)
    }

    /// Nearest point marker or marker under the pointer.
    pub fn hit_test(&self, pointer: Vec2) -> Option<HitTarget> {
        self.raycast(pointer).into_iter().find_map(|hit| {
            match self.scene.get(hit.key)?.tag {
                NodeTag::PointMarker { index } => Some(HitTarget::PointMarker(index)),
                NodeTag::Marker { index } => Some(HitTarget::Marker(index)),
                _ => None,
            }
        })
    }
}

/// Positions one label from its anchor projection. Returns `true` when the
/// label is on screen but has not been measured yet.
#[allow(clippy::too_many_arguments)]
fn place_label<S: LabelSurface>(
    surface: &mut S,
    timeline: &mut Timeline,
    now: Instant,
    projection: Projection,
    viewport: Viewport,
    id: &str,
    cached_width: &mut Option<f32>,
    fallback_width: f32,
    sprite_size: f32,
) -> bool {
    if !projection.on_screen(viewport) {
        surface.set_displayed(id, false);
        timeline.cancel(&Deferred::RevealLabel(id.to_string()));
        return false;
    }

    let measured = surface.measured_width(id).filter(|w| *w > 0.0);
    if measured.is_some() {
        *cached_width = measured;
    }
    let width = measured.or(*cached_width).unwrap_or(fallback_width);
    surface.set_transform(
        id,
        Vec2::new(projection.screen.x - width / 2.0, projection.screen.y - sprite_size / 2.0),
    );

    // reveal later so the label does not flash at its previous spot
    if !surface.is_displayed(id) {
        timeline.schedule_once(now + LABEL_REVEAL_DELAY, Deferred::RevealLabel(id.to_string()));
    }
    measured.is_none()
}
