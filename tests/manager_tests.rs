// Viewer state driven with a synthetic clock and the in-memory label board.

use glam::{Quat, Vec2, Vec3};
use panorama_tour::camera::{MAX_FOV, MIN_FOV};
use panorama_tour::config::{LabelContent, Marker, TourStop, ViewerSettings};
use panorama_tour::labels::{marker_label_id, point_label_id};
use panorama_tour::manager::TransitionPhase;
use panorama_tour::scene::PARKED_POSITION;
use panorama_tour::{HitTarget, LabelBoard, LabelSurface, LabelsChanged, Node, NodeTag, ViewerManager, ON_LABELS_CHANGE};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

const EPS: f32 = 1e-3;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn stops() -> Vec<TourStop> {
    vec![
        TourStop::new(Vec3::ZERO, "builtin:grid-a").with_label("A"),
        TourStop::new(Vec3::new(0.0, 0.0, -2.0), "builtin:grid-b").with_label("B"),
        TourStop::new(Vec3::new(3.0, 0.0, 0.0), "builtin:grid-c").with_label("C"),
    ]
}

fn viewer(t0: Instant) -> ViewerManager<LabelBoard> {
    let mut v = ViewerManager::new(LabelBoard::new(), t0);
    v.set_size(800.0, 600.0);
    v.set_points(stops());
    v
}

fn sphere(v: &ViewerManager<LabelBoard>, index: usize) -> &Node {
    let id = v.point_mesh(index).and_then(|m| m.sphere).unwrap();
    v.scene().get(id).unwrap()
}

fn point_marker(v: &ViewerManager<LabelBoard>, index: usize) -> &Node {
    let id = v.point_mesh(index).and_then(|m| m.point_marker).unwrap();
    v.scene().get(id).unwrap()
}

fn mount_all(v: &mut ViewerManager<LabelBoard>) {
    let ids: Vec<String> = v.labels().map(|l| l.id.clone()).collect();
    v.surface_mut().sync(ids.iter().map(String::as_str));
}

#[test]
fn first_stop_is_shown_after_set_points() {
    let v = viewer(Instant::now());
    assert_eq!(v.len(), 3);
    assert_eq!(v.active_index(), 0);
    assert_eq!(sphere(&v, 0).opacity, 1.0);
    assert_eq!(sphere(&v, 1).position, PARKED_POSITION);
    assert_eq!(sphere(&v, 2).opacity, 0.0);
    assert_eq!(v.point_labels().len(), 3);
    assert!(!point_marker(&v, 0).visible);
    assert!(point_marker(&v, 1).visible);
}

#[test]
fn set_points_keeps_nodes_of_unchanged_stops() {
    let mut v = viewer(Instant::now());
    let before: Vec<_> = (0..3).map(|i| v.point_mesh(i).cloned().unwrap()).collect();

    let [a, b, c]: [TourStop; 3] = stops().try_into().unwrap();
    let d = TourStop::new(Vec3::new(0.0, 0.0, 4.0), "builtin:grid-d");
    v.set_points(vec![c, a, d]);

    assert_eq!(v.len(), 3);
    assert_eq!(v.point_mesh(0).unwrap().sphere, before[2].sphere);
    assert_eq!(v.point_mesh(1).unwrap().sphere, before[0].sphere);
    assert_eq!(v.point_mesh(1).unwrap().point_marker, before[0].point_marker);
    assert_ne!(v.point_mesh(2).unwrap().sphere, before[1].sphere);

    // b is gone with its nodes
    assert!(!v.scene().contains(before[1].sphere.unwrap()));
    assert!(!v.scene().contains(before[1].point_marker.unwrap()));

    // retagged to the new order, and the active stop followed by identity
    assert_eq!(sphere(&v, 0).tag, NodeTag::ImageSphere { index: 0 });
    assert_eq!(v.active_index(), 1);
    assert_eq!(sphere(&v, 1).opacity, 1.0);
    assert_eq!(v.scene().count_where(|n| matches!(n.tag, NodeTag::ImageSphere { .. })), 3);
}

#[test]
fn set_points_with_same_list_is_a_no_op_for_nodes() {
    let mut v = viewer(Instant::now());
    let nodes = v.scene().len();
    let mesh = v.point_mesh(2).cloned();
    v.set_points(stops());
    assert_eq!(v.scene().len(), nodes);
    assert_eq!(v.point_mesh(2).cloned(), mesh);
}

#[test]
fn empty_points_clear_everything() {
    let mut v = viewer(Instant::now());
    v.set_points(Vec::new());
    assert!(v.is_empty());
    assert!(v.scene().is_empty());
    assert!(!v.move_to_point_by_index(0, Duration::ZERO));
}

#[test]
fn zero_duration_move_is_immediate_and_idempotent() {
    let mut v = viewer(Instant::now());

    for _ in 0..2 {
        assert!(v.move_to_point_by_index(2, Duration::ZERO));
        assert!(!v.is_navigating());
        assert_eq!(v.active_index(), 2);
        assert_eq!(v.camera().position, Vec3::new(3.0, 0.0, 0.0));

        let active = sphere(&v, 2);
        assert_eq!(active.opacity, 1.0);
        assert_eq!(active.position, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(active.scale, Vec3::ONE);
        for i in [0, 1] {
            assert_eq!(sphere(&v, i).opacity, 0.0);
            assert_eq!(sphere(&v, i).position, PARKED_POSITION);
        }
    }
}

#[test]
fn unknown_index_is_ignored() {
    let mut v = viewer(Instant::now());
    assert!(!v.move_to_point_by_index(7, ms(1000)));
    assert!(!v.is_navigating());
    assert_eq!(v.active_index(), 0);
}

#[test]
fn fov_stays_in_range() {
    let mut v = viewer(Instant::now());
    for _ in 0..50 {
        v.set_fov_delta(5.0);
    }
    assert_eq!(v.fov(), MAX_FOV);
    for _ in 0..50 {
        v.set_fov_delta(-5.0);
    }
    assert_eq!(v.fov(), MIN_FOV);
}

#[test]
fn navigation_ignores_requests_until_committed() {
    let t0 = Instant::now();
    let mut v = viewer(t0);

    assert!(v.move_to_point_by_index(1, ms(1000)));
    assert_eq!(v.transition_phase(), TransitionPhase::Animating);
    assert!(!v.move_to_point_by_index(2, ms(1000)));

    v.advance(t0 + ms(500));
    let z = v.camera().position.z;
    assert!(z < 0.0 && z > -2.0, "camera z {z}");
    // eased: more than half way at half time
    assert!(z < -1.0, "camera z {z}");

    v.advance(t0 + ms(1000));
    assert_eq!(v.transition_phase(), TransitionPhase::Completing);
    assert!(!v.move_to_point_by_index(2, ms(1000)));
    assert_eq!(sphere(&v, 0).opacity, 0.0);
    assert_eq!(sphere(&v, 0).position, PARKED_POSITION);
    assert_eq!(v.active_index(), 0);

    v.advance(t0 + ms(1099));
    assert!(v.is_navigating());

    v.advance(t0 + ms(1100));
    assert!(!v.is_navigating());
    assert_eq!(v.active_index(), 1);
    assert!(v.camera().position.abs_diff_eq(Vec3::new(0.0, 0.0, -2.0), EPS));
    assert_eq!(sphere(&v, 1).opacity, 1.0);
    assert_eq!(sphere(&v, 1).scale, Vec3::ONE);

    assert!(v.move_to_point_by_index(2, ms(1000)));
}

#[test]
fn spheres_cross_fade_during_navigation() {
    let t0 = Instant::now();
    let mut v = viewer(t0);
    v.move_to_point_by_index(1, ms(1000));

    // at start: outgoing opaque, incoming faint and far out along the travel direction
    assert!((sphere(&v, 0).opacity - 1.0).abs() < EPS);
    assert!((sphere(&v, 1).opacity - 0.3).abs() < EPS);
    assert!(sphere(&v, 1).position.abs_diff_eq(Vec3::new(0.0, 0.0, -6.0), EPS));
    assert!(sphere(&v, 1).scale.abs_diff_eq(Vec3::splat(2.0), EPS));

    v.advance(t0 + ms(500));
    assert!((sphere(&v, 0).opacity - 0.6).abs() < EPS);
    assert!((sphere(&v, 1).opacity - 0.65).abs() < EPS);
    assert!(sphere(&v, 0).position.abs_diff_eq(Vec3::new(0.0, 0.0, 4.0), EPS));
}

#[test]
fn point_markers_hide_while_travelling() {
    let t0 = Instant::now();
    let mut v = viewer(t0);
    v.move_to_point_by_index(2, ms(200));
    assert!((0..3).all(|i| !point_marker(&v, i).visible));

    v.advance(t0 + ms(300));
    assert_eq!(v.active_index(), 2);
    assert!(!point_marker(&v, 2).visible);
    assert!(point_marker(&v, 0).visible);

    // placed on a shell of 0.9 * radius around the new camera
    let p = point_marker(&v, 0).position;
    assert!((p.distance(Vec3::new(3.0, 0.0, 0.0)) - 4.5).abs() < EPS, "{p:?}");
}

#[test]
fn set_markers_adds_sprites_lines_and_labels() {
    let mut v = viewer(Instant::now());
    let payloads: Rc<RefCell<Vec<LabelsChanged>>> = Rc::default();
    let sink = payloads.clone();
    v.events_mut().add_listener(
        ON_LABELS_CHANGE,
        Rc::new(move |change: &LabelsChanged| {
            sink.borrow_mut().push(change.clone());
            anyhow::Ok(())
        }),
    );

    v.set_markers(&[
        Marker::new(Vec3::new(2.0, 0.0, 3.0), LabelContent::Text("sofa".into())),
        Marker::new(Vec3::new(2.0, 0.0, -2.0), LabelContent::Text("lamp".into()))
            .with_line_to(Vec3::new(2.5, -0.2, -2.0)),
    ]);

    let scene = v.scene();
    assert_eq!(scene.count_where(|n| matches!(n.tag, NodeTag::Marker { .. })), 2);
    assert_eq!(scene.count_where(|n| matches!(n.tag, NodeTag::MarkerLine { .. })), 1);
    assert_eq!(v.point_mesh(0).unwrap().markers.len(), 2);

    let payloads = payloads.borrow();
    assert_eq!(payloads.len(), 1);
    let labels = &payloads[0].labels;
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[0].id, marker_label_id(0));
    assert_eq!(labels[1].id, marker_label_id(1));
}

#[test]
fn markers_follow_the_camera_and_are_replaced() {
    let mut v = viewer(Instant::now());
    v.move_to_point_by_index(2, Duration::ZERO);
    v.set_markers(&[Marker::new(Vec3::new(0.0, 0.0, -3.0), LabelContent::Text("x".into()))]);

    let id = v.point_mesh(2).unwrap().markers[0];
    assert_eq!(v.scene().get(id).unwrap().position, Vec3::new(3.0, 0.0, -3.0));

    v.set_markers(&[]);
    assert_eq!(v.scene().count_where(|n| n.tag.is_marker_content()), 0);
    assert!(v.marker_labels().is_empty());
}

#[test]
fn failing_listener_does_not_stop_markers() {
    let mut v = viewer(Instant::now());
    v.events_mut().add_listener(
        ON_LABELS_CHANGE,
        Rc::new(|_: &LabelsChanged| Err::<(), _>(anyhow::anyhow!("listener down"))),
    );
    v.set_markers(&[Marker::new(Vec3::new(0.0, 0.0, -3.0), LabelContent::Text("x".into()))]);
    assert_eq!(v.marker_labels().len(), 1);
}

#[test]
fn labels_reveal_after_a_delay_and_retry_until_measured() {
    let t0 = Instant::now();
    let mut v = viewer(t0);
    mount_all(&mut v);
    v.update_point_marker_label_positions();

    let b = point_label_id(1);
    let slot = *v.surface().slot(&b).unwrap();
    assert!(!slot.displayed);
    // marker of b sits straight ahead; unmeasured labels centre on zero width
    assert!((slot.offset.x - 400.0).abs() < EPS, "{slot:?}");
    assert!((slot.offset.y - (300.0 - 17.5)).abs() < EPS, "{slot:?}");

    v.advance(t0 + ms(99));
    assert!(!v.surface().is_displayed(&b));
    v.advance(t0 + ms(100));
    assert!(v.surface().is_displayed(&b));

    // active stop and off-screen stops stay hidden
    assert!(!v.surface().is_displayed(&point_label_id(0)));
    assert!(!v.surface().is_displayed(&point_label_id(2)));

    v.surface_mut().record_width(&b, 80.0);
    v.advance(t0 + ms(200));
    let slot = v.surface().slot(&b).unwrap();
    assert!((slot.offset.x - 360.0).abs() < EPS, "{slot:?}");
}

#[test]
fn active_point_label_stays_hidden_after_reorder() {
    let t0 = Instant::now();
    let mut v = viewer(t0);
    mount_all(&mut v);
    for i in 0..3 {
        v.surface_mut().record_width(&point_label_id(i), 60.0);
    }
    // queues the reveal of b, which sits at index 1
    v.update_point_marker_label_positions();

    let [a, b, c]: [TourStop; 3] = stops().try_into().unwrap();
    v.set_points(vec![b, a, c]);
    assert_eq!(v.active_index(), 1);

    v.advance(t0 + ms(150));
    assert!(!v.surface().is_displayed(&point_label_id(1)));
    v.advance(t0 + ms(400));
    assert!(!v.surface().is_displayed(&point_label_id(1)));
}

#[test]
fn labels_hide_when_turned_away() {
    let t0 = Instant::now();
    let mut v = viewer(t0);
    mount_all(&mut v);
    v.update_point_marker_label_positions();
    v.advance(t0 + ms(100));
    let b = point_label_id(1);
    assert!(v.surface().is_displayed(&b));

    // half a turn
    v.move_camera_2d_delta(Vec2::new(std::f32::consts::PI / 0.001, 0.0), 1.0);
    assert!(!v.surface().is_displayed(&b));
}

#[test]
fn navigation_hides_point_labels() {
    let t0 = Instant::now();
    let mut v = viewer(t0);
    mount_all(&mut v);
    v.update_point_marker_label_positions();
    v.advance(t0 + ms(100));
    assert!(v.surface().is_displayed(&point_label_id(1)));

    v.move_to_point_by_index(2, ms(1000));
    assert!((0..3).all(|i| !v.surface().is_displayed(&point_label_id(i))));
}

#[test]
fn clicking_a_point_marker_hits_it() {
    let v = viewer(Instant::now());
    assert_eq!(v.hit_test(Vec2::new(400.0, 300.0)), Some(HitTarget::PointMarker(1)));
    assert_eq!(v.hit_test(Vec2::new(10.0, 10.0)), None);
}

#[test]
fn auto_rotate_resumes_after_quiet_second() {
    let t0 = Instant::now();
    let mut v = viewer(t0);
    v.set_auto_rotate(true, 1.0);
    assert!(v.should_auto_rotate());

    v.pause_auto_rotate();
    v.resume_auto_rotate_later();
    assert!(!v.should_auto_rotate());

    v.advance(t0 + ms(500));
    v.resume_auto_rotate_later();
    v.advance(t0 + ms(1200));
    assert!(!v.should_auto_rotate());

    v.advance(t0 + ms(1500));
    assert!(v.should_auto_rotate());
}

#[test]
fn pause_cancels_pending_resume() {
    let t0 = Instant::now();
    let mut v = viewer(t0);
    v.set_auto_rotate(true, 1.0);
    v.pause_auto_rotate();
    v.resume_auto_rotate_later();
    v.pause_auto_rotate();
    v.advance(t0 + ms(2000));
    assert!(!v.should_auto_rotate());
}

#[test]
fn frame_rotates_until_stopped() {
    let t0 = Instant::now();
    let mut v = viewer(t0);
    v.set_auto_rotate(true, 1.0);

    // not started yet
    assert!(!v.frame(t0));
    assert_eq!(v.camera().orientation, Quat::IDENTITY);

    v.start_drawing();
    assert!(v.is_drawing());
    assert!(v.frame(t0 + ms(16)));
    let turned = v.camera().orientation;
    assert_ne!(turned, Quat::IDENTITY);

    v.stop_drawing();
    assert!(!v.frame(t0 + ms(32)));
    assert_eq!(v.camera().orientation, turned);
}

#[test]
fn frame_drives_navigation() {
    let t0 = Instant::now();
    let mut v = viewer(t0);
    v.start_drawing();
    v.move_to_point_by_index(1, ms(100));
    v.frame(t0 + ms(100));
    v.frame(t0 + ms(200));
    assert_eq!(v.active_index(), 1);
    assert!(!v.is_navigating());
}

#[test]
fn settings_apply_scales_and_sprites() {
    let mut v = viewer(Instant::now());
    let settings = ViewerSettings {
        point_marker_sprite: "icons/door.png".into(),
        point_marker_sprite_scale: Some(0.5),
        auto_rotate: true,
        initial_camera_rotation: Some([0.0, std::f32::consts::FRAC_PI_2, 0.0]),
        ..ViewerSettings::default()
    };
    let nodes = v.scene().len();
    v.apply_settings(&settings);

    let marker = point_marker(&v, 1);
    assert_eq!(marker.texture(), Some("icons/door.png"));
    assert_eq!(marker.scale, Vec3::new(0.5, 0.5, 1.0));
    assert_eq!(v.scene().len(), nodes);
    assert!(v.should_auto_rotate());
    assert!(v.camera().forward().abs_diff_eq(Vec3::NEG_X, EPS), "{:?}", v.camera().forward());
}
