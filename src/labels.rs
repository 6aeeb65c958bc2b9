// labels.rs: overlay label descriptors and the surface they are laid out on

use crate::config::LabelContent;
use glam::Vec2;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    /// Navigation label of a panorama position; clicking it travels there.
    Point { index: usize },
    Marker { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub id: String,
    pub kind: LabelKind,
    pub content: Option<LabelContent>,
    /// Side of the clickable icon area above the content, in pixels.
    pub sprite_size: f32,
}

impl Label {
    pub fn point(index: usize, content: Option<LabelContent>, sprite_size: f32) -> Self {
        Self {
            id: point_label_id(index),
            kind: LabelKind::Point { index },
            content,
            sprite_size,
        }
    }

    pub fn marker(index: usize, content: LabelContent, sprite_size: f32) -> Self {
        Self {
            id: marker_label_id(index),
            kind: LabelKind::Marker { index },
            content: Some(content),
            sprite_size,
        }
    }
}

pub fn point_label_id(index: usize) -> String {
    format!("360_point_marker_label_{index}")
}

pub fn marker_label_id(index: usize) -> String {
    format!("360_marker_label_{index}")
}

/// The place labels live once the host has mounted them.
///
/// The viewer never mounts or unmounts labels itself; it only moves and
/// shows/hides the ones it finds by id.
pub trait LabelSurface {
    fn is_mounted(&self, id: &str) -> bool;

    /// Laid-out width in pixels, `None` until the host has measured it.
    fn measured_width(&self, id: &str) -> Option<f32>;

    /// Top-left corner of the label, in pixels.
    fn set_transform(&mut self, id: &str, offset: Vec2);

    fn set_displayed(&mut self, id: &str, displayed: bool);

    fn is_displayed(&self, id: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelSlot {
    pub offset: Vec2,
    pub displayed: bool,
    pub width: Option<f32>,
}

impl Default for LabelSlot {
    fn default() -> Self {
        Self {
            offset: Vec2::new(-1000.0, -1000.0),
            displayed: false,
            width: None,
        }
    }
}

/// In-memory label surface. The egui overlay reads it to place label areas
/// and writes measured widths back after each frame.
#[derive(Debug, Default)]
pub struct LabelBoard {
    slots: HashMap<String, LabelSlot>,
}

impl LabelBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, id: &str) {
        self.slots.entry(id.to_string()).or_default();
    }

    /// Mounts exactly `ids`; slots of other ids are dropped, existing ones
    /// keep their state.
    pub fn sync<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        let wanted: Vec<&str> = ids.into_iter().collect();
        self.slots.retain(|id, _| wanted.contains(&id.as_str()));
        for id in wanted {
            self.mount(id);
        }
    }

    pub fn record_width(&mut self, id: &str, width: f32) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.width = (width > 0.0).then_some(width);
        }
    }

    pub fn slot(&self, id: &str) -> Option<&LabelSlot> {
        self.slots.get(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl LabelSurface for LabelBoard {
    fn is_mounted(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    fn measured_width(&self, id: &str) -> Option<f32> {
        self.slots.get(id).and_then(|s| s.width)
    }

    fn set_transform(&mut self, id: &str, offset: Vec2) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.offset = offset;
        }
    }

    fn set_displayed(&mut self, id: &str, displayed: bool) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.displayed = displayed;
        }
    }

    fn is_displayed(&self, id: &str) -> bool {
        self.slots.get(id).is_some_and(|s| s.displayed)
    }
}
