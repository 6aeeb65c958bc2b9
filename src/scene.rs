// scene.rs: flat scene graph consumed by the renderer

use glam::{Vec2, Vec3};
use std::collections::BTreeMap;
use std::fmt;

/// Where inactive image spheres are parked.
pub const PARKED_POSITION: Vec3 = Vec3::new(-1000.0, -1000.0, -1000.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

/// Role of a node, with the index of the position or marker it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTag {
    ImageSphere { index: usize },
    PointMarker { index: usize },
    Marker { index: usize },
    MarkerLine { index: usize },
}

impl NodeTag {
    pub fn is_marker_content(&self) -> bool {
        matches!(self, NodeTag::Marker { .. } | NodeTag::MarkerLine { .. })
    }

    pub fn with_index(self, index: usize) -> Self {
        match self {
            NodeTag::ImageSphere { .. } => NodeTag::ImageSphere { index },
            NodeTag::PointMarker { .. } => NodeTag::PointMarker { index },
            NodeTag::Marker { .. } => NodeTag::Marker { index },
            NodeTag::MarkerLine { .. } => NodeTag::MarkerLine { index },
        }
    }
}

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTag::ImageSphere { index } => write!(f, "img_sphere_{index}"),
            NodeTag::PointMarker { index } => write!(f, "point_marker_{index}"),
            NodeTag::Marker { index } => write!(f, "marker_{index}"),
            NodeTag::MarkerLine { index } => write!(f, "marker_line_{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Inward-facing textured sphere.
    Sphere { radius: f32, texture: String },
    /// Camera-facing textured quad.
    Sprite { texture: String },
    /// Segment in world space, independent of the node position.
    Line { from: Vec3, to: Vec3, color: [f32; 4] },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub tag: NodeTag,
    pub kind: NodeKind,
    pub position: Vec3,
    pub scale: Vec3,
    pub opacity: f32,
    pub visible: bool,
    /// Last measured width of the label attached to this node, in pixels.
    pub label_width: Option<f32>,
}

impl Node {
    pub fn new(tag: NodeTag, kind: NodeKind) -> Self {
        Self {
            tag,
            kind,
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            opacity: 1.0,
            visible: true,
            label_width: None,
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_sprite_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::new(scale, scale, 1.0);
        self
    }

    pub fn texture(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Sphere { texture, .. } | NodeKind::Sprite { texture } => Some(texture),
            NodeKind::Line { .. } => None,
        }
    }

    pub fn sprite_size(&self) -> Vec2 {
        Vec2::new(self.scale.x, self.scale.y)
    }
}

/// Nodes keyed by id; iteration follows insertion order, which is also the
/// draw order.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: BTreeMap<NodeId, Node>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn remove_where(&mut self, pred: impl Fn(&Node) -> bool) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|_, node| !pred(node));
        before - self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    pub fn count_where(&self, pred: impl Fn(&Node) -> bool) -> usize {
        self.nodes.values().filter(|n| pred(n)).count()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every texture source referenced by a node, deduplicated.
    pub fn texture_sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self.nodes.values().filter_map(Node::texture).collect();
        sources.sort_unstable();
        sources.dedup();
        sources
    }
}
