// config.rs: tour description (positions, markers, viewer settings), read from JSON

use crate::error::TourError;
use glam::Vec3;
use serde::{Deserialize, Deserializer};
use std::path::Path;

pub const DEFAULT_POINT_MARKER_SPRITE: &str = "builtin:point-marker";
pub const DEFAULT_MARKER_SPRITE: &str = "builtin:marker";
pub const DEFAULT_TRANSITION_MS: u64 = 1000;

/// Text of a label, or a small card with a title, body lines and a link.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LabelContent {
    Text(String),
    Rich(RichContent),
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RichContent {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub lines: Vec<String>,
    #[serde(default)]
    pub link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Link {
    pub text: String,
    pub href: String,
}

/// Point of interest shown while its position is active.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Marker {
    /// Offset from the camera of the active position.
    #[serde(deserialize_with = "deserialize_point")]
    pub point: Vec3,
    pub content: LabelContent,
    #[serde(default, deserialize_with = "deserialize_opt_point")]
    pub line_to: Option<Vec3>,
    #[serde(default)]
    pub sprite: Option<String>,
    #[serde(default)]
    pub sprite_scale: Option<f32>,
}

impl Marker {
    pub fn new(point: Vec3, content: LabelContent) -> Self {
        Self {
            point,
            content,
            line_to: None,
            sprite: None,
            sprite_scale: None,
        }
    }

    pub fn with_line_to(mut self, to: Vec3) -> Self {
        self.line_to = Some(to);
        self
    }
}

/// One panorama of the tour, anchored at a point in the scene.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TourStop {
    #[serde(deserialize_with = "deserialize_point")]
    pub point: Vec3,
    pub img: String,
    #[serde(default)]
    pub label: Option<LabelContent>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub sprite: Option<String>,
    #[serde(default)]
    pub sprite_scale: Option<f32>,
}

impl TourStop {
    pub fn new(point: Vec3, img: impl Into<String>) -> Self {
        Self {
            point,
            img: img.into(),
            label: None,
            markers: Vec::new(),
            sprite: None,
            sprite_scale: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(LabelContent::Text(label.into()));
        self
    }

    pub fn with_markers(mut self, markers: Vec<Marker>) -> Self {
        self.markers = markers;
        self
    }

    /// Two stops are the same panorama when image and anchor match exactly.
    pub fn same_panorama(&self, other: &TourStop) -> bool {
        self.img == other.img && crate::math::position_equals(self.point, other.point)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LabelStyle {
    pub background: [u8; 4],
    pub text_color: [u8; 4],
    pub padding: f32,
    pub rounding: f32,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            background: [0, 0, 0, 204],
            text_color: [255, 255, 255, 255],
            padding: 10.0,
            rounding: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub drag_speed: f32,
    pub auto_rotate: bool,
    pub auto_rotate_speed: f32,
    /// XYZ Euler angles in radians.
    pub initial_camera_rotation: Option<[f32; 3]>,
    pub point_marker_sprite: String,
    pub marker_sprite: String,
    pub point_marker_sprite_scale: Option<f32>,
    pub marker_sprite_scale: Option<f32>,
    pub hide_labels: bool,
    pub enable_zoom: bool,
    pub transition_ms: u64,
    pub label_style: LabelStyle,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            drag_speed: 1.0,
            auto_rotate: false,
            auto_rotate_speed: 1.0,
            initial_camera_rotation: None,
            point_marker_sprite: DEFAULT_POINT_MARKER_SPRITE.to_string(),
            marker_sprite: DEFAULT_MARKER_SPRITE.to_string(),
            point_marker_sprite_scale: None,
            marker_sprite_scale: None,
            hide_labels: false,
            enable_zoom: true,
            transition_ms: DEFAULT_TRANSITION_MS,
            label_style: LabelStyle::default(),
        }
    }
}

/// A tour file. Either a list of `positions`, or a single `img` with its
/// `markers`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Tour {
    #[serde(default)]
    pub settings: ViewerSettings,
    #[serde(default)]
    pub positions: Vec<TourStop>,
    #[serde(default)]
    pub img: Option<String>,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

impl Tour {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Reads a tour file. Relative image and sprite paths are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self, TourError> {
        let text = std::fs::read_to_string(path).map_err(|source| TourError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut tour = Self::from_json(&text).map_err(|source| TourError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if tour.stops().is_empty() {
            return Err(TourError::NoPositions(path.to_path_buf()));
        }
        if let Some(base) = path.parent() {
            tour.resolve_relative(base);
        }
        log::info!("loaded tour {:?} with {} positions", path, tour.stops().len());
        Ok(tour)
    }

    /// The positions to show; single-image tours become one stop at the origin.
    pub fn stops(&self) -> Vec<TourStop> {
        match &self.img {
            Some(img) => vec![TourStop::new(Vec3::ZERO, img.clone()).with_markers(self.markers.clone())],
            None => self.positions.clone(),
        }
    }

    pub fn resolve_relative(&mut self, base: &Path) {
        let fix = |src: &mut String| *src = resolve_source(src, base);
        let fix_opt = |src: &mut Option<String>| {
            if let Some(s) = src {
                *s = resolve_source(s, base);
            }
        };

        if let Some(img) = &mut self.img {
            fix(img);
        }
        for m in &mut self.markers {
            fix_opt(&mut m.sprite);
        }
        for stop in &mut self.positions {
            fix(&mut stop.img);
            fix_opt(&mut stop.sprite);
            for m in &mut stop.markers {
                fix_opt(&mut m.sprite);
            }
        }
        fix(&mut self.settings.point_marker_sprite);
        fix(&mut self.settings.marker_sprite);
    }

    /// Three rooms with procedural panoramas, used when no tour file is given.
    pub fn demo() -> Self {
        let sofa = Marker::new(
            Vec3::new(2.0, 0.0, 3.0),
            LabelContent::Rich(RichContent {
                title: Some("A cool item".to_string()),
                lines: vec!["Hand made, one of a kind.".to_string()],
                link: Some(Link {
                    text: "Click here to buy now".to_string(),
                    href: "https://example.com/".to_string(),
                }),
            }),
        );
        let lamp = Marker::new(
            Vec3::new(2.0, 0.0, -2.0),
            LabelContent::Text("Floor lamp".to_string()),
        )
        .with_line_to(Vec3::new(2.5, -0.2, -2.0));

        Self {
            settings: ViewerSettings {
                auto_rotate: true,
                drag_speed: 0.5,
                ..ViewerSettings::default()
            },
            positions: vec![
                TourStop::new(Vec3::ZERO, "builtin:grid-bedroom")
                    .with_label("Bedroom")
                    .with_markers(vec![sofa, lamp]),
                TourStop::new(Vec3::new(1.0, 0.0, 0.0), "builtin:grid-living-room")
                    .with_label("Living Room"),
                TourStop::new(Vec3::new(3.0, 0.0, 3.0), "builtin:grid-kitchen").with_label("Kitchen"),
            ],
            img: None,
            markers: Vec::new(),
        }
    }
}

fn resolve_source(src: &str, base: &Path) -> String {
    if src.is_empty() || src.starts_with("builtin:") || src.contains("://") || Path::new(src).is_absolute() {
        return src.to_string();
    }
    base.join(src).to_string_lossy().into_owned()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PointRepr {
    Object { x: f32, y: f32, z: f32 },
    Array([f32; 3]),
}

impl From<PointRepr> for Vec3 {
    fn from(p: PointRepr) -> Self {
        match p {
            PointRepr::Object { x, y, z } => Vec3::new(x, y, z),
            PointRepr::Array([x, y, z]) => Vec3::new(x, y, z),
        }
    }
}

fn deserialize_point<'de, D: Deserializer<'de>>(d: D) -> Result<Vec3, D::Error> {
    PointRepr::deserialize(d).map(Vec3::from)
}

fn deserialize_opt_point<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec3>, D::Error> {
    Ok(Option::<PointRepr>::deserialize(d)?.map(Vec3::from))
}
