// Event bus, deferred task timeline and tweens.

use glam::Vec3;
use panorama_tour::events::{EventBus, Listener};
use panorama_tour::schedule::{Deferred, Timeline};
use panorama_tour::tween::{Easing, Tween};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn recorder(log: &Rc<RefCell<Vec<String>>>, name: &'static str) -> Listener<u32> {
    let log = log.clone();
    Rc::new(move |payload: &u32| {
        log.borrow_mut().push(format!("{name}:{payload}"));
        anyhow::Ok(())
    })
}

#[test]
fn listeners_run_in_registration_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut bus = EventBus::new();
    bus.add_listener("change", recorder(&log, "a"));
    bus.add_listener("change", recorder(&log, "b"));
    bus.add_listener("other", recorder(&log, "c"));

    bus.dispatch("change", &7).unwrap();
    assert_eq!(*log.borrow(), vec!["a:7", "b:7"]);
}

#[test]
fn removed_listener_is_not_called() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut bus = EventBus::new();
    let a = recorder(&log, "a");
    bus.add_listener("change", a.clone());
    bus.add_listener("change", recorder(&log, "b"));

    bus.remove_listener("change", &a);
    assert_eq!(bus.listener_count("change"), 1);

    bus.dispatch("change", &1).unwrap();
    assert_eq!(*log.borrow(), vec!["b:1"]);
}

#[test]
fn failing_listener_stops_dispatch() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut bus = EventBus::new();
    bus.add_listener("change", recorder(&log, "a"));
    bus.add_listener("change", Rc::new(|_: &u32| Err::<(), _>(anyhow::anyhow!("boom"))));
    bus.add_listener("change", recorder(&log, "c"));

    let err = bus.dispatch("change", &2).unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert_eq!(*log.borrow(), vec!["a:2"]);
}

#[test]
fn dispatch_without_listeners_is_ok() {
    let bus: EventBus<u32> = EventBus::default();
    assert!(bus.dispatch("nothing", &0).is_ok());
    assert_eq!(bus.listener_count("nothing"), 0);
}

#[test]
fn debounce_keeps_only_the_latest() {
    let t0 = Instant::now();
    let mut timeline = Timeline::new();
    timeline.debounce(t0 + ms(1000), Deferred::ResumeAutoRotate);
    timeline.debounce(t0 + ms(1500), Deferred::ResumeAutoRotate);
    assert_eq!(timeline.len(), 1);

    assert!(timeline.take_due(t0 + ms(1200)).is_empty());
    assert_eq!(timeline.take_due(t0 + ms(1500)), vec![Deferred::ResumeAutoRotate]);
    assert!(timeline.is_empty());
}

#[test]
fn schedule_once_ignores_duplicates() {
    let t0 = Instant::now();
    let mut timeline = Timeline::new();
    assert!(timeline.schedule_once(t0 + ms(100), Deferred::RetryPointLabels));
    assert!(!timeline.schedule_once(t0 + ms(200), Deferred::RetryPointLabels));
    assert!(timeline.schedule_once(t0 + ms(100), Deferred::RetryMarkerLabels));
    assert_eq!(timeline.len(), 2);
}

#[test]
fn due_tasks_come_out_earliest_first() {
    let t0 = Instant::now();
    let mut timeline = Timeline::new();
    timeline.schedule(t0 + ms(300), Deferred::RetryMarkerLabels);
    timeline.schedule(t0 + ms(100), Deferred::RevealLabel("x".into()));
    timeline.schedule(t0 + ms(900), Deferred::ResumeAutoRotate);

    let due = timeline.take_due(t0 + ms(500));
    assert_eq!(
        due,
        vec![Deferred::RevealLabel("x".into()), Deferred::RetryMarkerLabels]
    );
    assert!(timeline.is_pending(&Deferred::ResumeAutoRotate));

    timeline.cancel_where(|t| matches!(t, Deferred::ResumeAutoRotate));
    assert!(timeline.is_empty());
}

#[test]
fn linear_tween_interpolates() {
    let t0 = Instant::now();
    let tween = Tween::new(0.0f32, 10.0, t0, ms(1000));
    assert_eq!(tween.value_at(t0), 0.0);
    assert!((tween.value_at(t0 + ms(250)) - 2.5).abs() < 1e-3);
    assert_eq!(tween.value_at(t0 + ms(5000)), 10.0);
    assert!(tween.is_finished(t0 + ms(1000)));
    assert!(!tween.is_finished(t0 + ms(999)));
}

#[test]
fn quadratic_out_leads_linear() {
    let t0 = Instant::now();
    let tween = Tween::new(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0), t0, ms(1000)).with_easing(Easing::QuadraticOut);
    let half = tween.value_at(t0 + ms(500));
    assert!((half.x - 3.0).abs() < 1e-3, "{half:?}");
    assert_eq!(Easing::QuadraticOut.apply(1.0), 1.0);
}

#[test]
fn zero_duration_tween_is_done() {
    let t0 = Instant::now();
    let tween = Tween::new(1.0f32, 0.2, t0, Duration::ZERO);
    assert_eq!(tween.progress(t0), 1.0);
    assert_eq!(tween.value_at(t0), 0.2);
}
