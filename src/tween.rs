// tween.rs: time-based interpolation driven by an explicit clock

use glam::Vec3;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    QuadraticOut,
}

impl Easing {
    pub fn apply(self, k: f32) -> f32 {
        match self {
            Easing::Linear => k,
            Easing::QuadraticOut => k * (2.0 - k),
        }
    }
}

pub trait Lerp: Copy {
    fn lerp_to(self, to: Self, k: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp_to(self, to: Self, k: f32) -> Self {
        self + (to - self) * k
    }
}

impl Lerp for Vec3 {
    fn lerp_to(self, to: Self, k: f32) -> Self {
        self.lerp(to, k)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Tween<T: Lerp> {
    pub from: T,
    pub to: T,
    pub started: Instant,
    pub duration: Duration,
    pub easing: Easing,
}

impl<T: Lerp> Tween<T> {
    pub fn new(from: T, to: T, started: Instant, duration: Duration) -> Self {
        Self {
            from,
            to,
            started,
            duration,
            easing: Easing::Linear,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Progress in [0, 1]. A zero duration is complete immediately.
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn value_at(&self, now: Instant) -> T {
        let k = self.progress(now);
        if k >= 1.0 {
            return self.to;
        }
        self.from.lerp_to(self.to, self.easing.apply(k))
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

/// Opacity, position and uniform scale of an image sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereState {
    pub opacity: f32,
    pub position: Vec3,
    pub scale: f32,
}

impl Lerp for SphereState {
    fn lerp_to(self, to: Self, k: f32) -> Self {
        Self {
            opacity: self.opacity.lerp_to(to.opacity, k),
            position: self.position.lerp_to(to.position, k),
            scale: self.scale.lerp_to(to.scale, k),
        }
    }
}
