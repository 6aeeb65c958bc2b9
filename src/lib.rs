//! Core of the panorama tour viewer: camera math, scene graph, label
//! projection and the animated navigation between panorama positions.
//!
//! Everything in this crate is free of window and GPU handles so the viewer
//! state can be driven by tests with a synthetic clock. The binary wires it to
//! winit, wgpu and egui.

pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod labels;
pub mod manager;
pub mod math;
pub mod projector;
pub mod scene;
pub mod schedule;
pub mod texture;
pub mod tween;

pub use camera::{PerspectiveCamera, Viewport};
pub use config::{LabelContent, Marker, Tour, TourStop, ViewerSettings};
pub use error::TourError;
pub use events::{EventBus, ON_LABELS_CHANGE};
pub use labels::{Label, LabelBoard, LabelKind, LabelSurface};
pub use manager::{HitTarget, LabelsChanged, ViewerManager};
pub use projector::{CameraProjector, Projection, Projector};
pub use scene::{Node, NodeId, NodeKind, NodeTag, Scene};
