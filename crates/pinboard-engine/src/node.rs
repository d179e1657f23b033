// Imports
use p2d::bounding_volume::Aabb;
use pinboard_compose::ext::Vector2Ext;
use pinboard_compose::hittest;
use serde::{Deserialize, Serialize};

/// The registered node types.
///
/// Unknown tags deserialize to [NodeType::Unknown] so that a snapshot written by a newer
/// version loads with the foreign nodes skipped instead of failing wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "node_type")]
pub enum NodeType {
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "groupbox")]
    GroupBox,
    #[serde(other, skip_serializing)]
    Unknown,
}

impl NodeType {
    /// Whether nodes of this type reference an external media resource.
    pub fn is_media(self) -> bool {
        matches!(self, NodeType::Image | NodeType::Video)
    }
}

/// The type-dependent node payload.
///
/// The core only ever reads `hash` and `filename` (for the resource lifecycle); everything
/// else is carried opaquely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename = "node_properties")]
pub struct NodeProperties {
    #[serde(rename = "hash", skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(rename = "filename", skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(rename = "text", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename = "node_flags")]
pub struct NodeFlags {
    #[serde(rename = "hide_title")]
    pub hide_title: bool,
    #[serde(rename = "groupbox")]
    pub groupbox: bool,
}

/// A placed media item on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename = "node")]
pub struct Node {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// World-space position of the top-left corner.
    #[serde(rename = "pos")]
    pos: na::Vector2<f64>,
    /// World-space extents.
    #[serde(rename = "size")]
    size: na::Vector2<f64>,
    /// Rotation in degrees, canonicalized into [0, 360).
    #[serde(rename = "rotation")]
    rotation: f64,
    /// The preserved width / height ratio. Updated after every resize.
    #[serde(rename = "aspect_ratio")]
    aspect_ratio: f64,
    /// The aspect recorded at creation, restored by double-clicking the resize handle.
    #[serde(rename = "original_aspect")]
    original_aspect: f64,
    #[serde(rename = "title")]
    pub title: String,
    #[serde(rename = "properties")]
    pub properties: NodeProperties,
    #[serde(rename = "flags")]
    pub flags: NodeFlags,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            node_type: NodeType::Image,
            pos: na::Vector2::zeros(),
            size: na::Vector2::from_element(Self::MIN_NODE_EXTENT),
            rotation: 0.0,
            aspect_ratio: 1.0,
            original_aspect: 1.0,
            title: String::new(),
            properties: NodeProperties::default(),
            flags: NodeFlags::default(),
        }
    }
}

impl Node {
    /// Minimum width and height of a node, in world units.
    pub const MIN_NODE_EXTENT: f64 = 100.0;
    /// Minimum width and height a node can reach through selection bounding-box scaling.
    pub const MIN_BBOX_EXTENT: f64 = 50.0;
    /// Height of the group box title bar, in world units.
    pub const GROUPBOX_TITLEBAR_HEIGHT: f64 = 28.0;

    pub fn new(node_type: NodeType, pos: na::Vector2<f64>, size: na::Vector2<f64>) -> Self {
        let size = size.maxs(&na::Vector2::from_element(1.0));
        let aspect = size[0] / size[1];
        Self {
            node_type,
            pos,
            size,
            aspect_ratio: aspect,
            original_aspect: aspect,
            flags: NodeFlags {
                groupbox: node_type == NodeType::GroupBox,
                ..NodeFlags::default()
            },
            ..Self::default()
        }
    }

    pub fn pos(&self) -> na::Vector2<f64> {
        self.pos
    }

    pub fn set_pos(&mut self, pos: na::Vector2<f64>) {
        self.pos = pos;
    }

    pub fn translate(&mut self, offset: na::Vector2<f64>) {
        self.pos += offset;
    }

    pub fn size(&self) -> na::Vector2<f64> {
        self.size
    }

    /// Set the extents, keeping the stored aspect ratio in sync.
    pub fn set_size(&mut self, size: na::Vector2<f64>) {
        self.size = size.maxs(&na::Vector2::from_element(1.0));
        self.aspect_ratio = self.size[0] / self.size[1];
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: f64) {
        self.rotation = rotation.rem_euclid(360.0);
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }

    pub fn original_aspect(&self) -> f64 {
        self.original_aspect
    }

    /// Restore the original aspect, keeping the current width.
    pub fn restore_original_aspect(&mut self) {
        if self.original_aspect > 0.0 {
            self.set_size(na::vector![
                self.size[0],
                self.size[0] / self.original_aspect
            ]);
        }
    }

    pub fn center(&self) -> na::Vector2<f64> {
        self.pos + self.size * 0.5
    }

    pub fn set_center(&mut self, center: na::Vector2<f64>) {
        self.pos = center - self.size * 0.5;
    }

    /// The axis-aligned bounds of the (possibly rotated) node.
    pub fn bounds(&self) -> Aabb {
        if self.rotation == 0.0 {
            return Aabb::new(self.pos.into(), (self.pos + self.size).into());
        }

        let center = self.center();
        let angle = self.rotation.to_radians();
        let corners = [
            self.pos,
            self.pos + na::vector![self.size[0], 0.0],
            self.pos + self.size,
            self.pos + na::vector![0.0, self.size[1]],
        ];

        let mut mins = na::Vector2::from_element(f64::INFINITY);
        let mut maxs = na::Vector2::from_element(f64::NEG_INFINITY);
        for corner in corners {
            let rotated = hittest::rotate_about(corner, center, angle);
            mins = mins.mins(&rotated);
            maxs = maxs.maxs(&rotated);
        }

        Aabb::new(mins.into(), maxs.into())
    }

    /// Whether the world-space probe hits the node body.
    ///
    /// Group boxes are transparent here; their only opaque hit region is the title bar.
    pub fn contains_point(&self, probe: na::Vector2<f64>) -> bool {
        if self.node_type == NodeType::GroupBox {
            return false;
        }
        hittest::rotated_rect_contains(self.pos, self.size, self.rotation, probe)
    }

    /// Whether the world-space probe hits the group box title bar.
    pub fn titlebar_contains_point(&self, probe: na::Vector2<f64>) -> bool {
        if self.node_type != NodeType::GroupBox {
            return false;
        }
        // The bar is hit-tested in the node's rotated frame, like the body.
        let local = hittest::rotate_about(probe, self.center(), -self.rotation.to_radians());
        local[0] >= self.pos[0]
            && local[0] <= self.pos[0] + self.size[0]
            && local[1] >= self.pos[1]
            && local[1] <= self.pos[1] + Self::GROUPBOX_TITLEBAR_HEIGHT
    }

    /// The content hash of the referenced resource, for media nodes.
    pub fn resource_hash(&self) -> Option<&str> {
        if self.node_type.is_media() {
            self.properties.hash.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotation_canonicalized() {
        let mut node = Node::new(
            NodeType::Image,
            na::vector![0.0, 0.0],
            na::vector![200.0, 100.0],
        );
        node.set_rotation(-90.0);
        assert_relative_eq!(node.rotation(), 270.0);
        node.set_rotation(725.0);
        assert_relative_eq!(node.rotation(), 5.0);
    }

    #[test]
    fn aspect_follows_resize() {
        let mut node = Node::new(
            NodeType::Image,
            na::vector![0.0, 0.0],
            na::vector![200.0, 100.0],
        );
        assert_relative_eq!(node.aspect_ratio(), 2.0);
        node.set_size(na::vector![300.0, 100.0]);
        assert_relative_eq!(node.aspect_ratio(), 3.0);
        assert_relative_eq!(node.original_aspect(), 2.0);
    }

    #[test]
    fn restore_original_aspect_keeps_width() {
        let mut node = Node::new(
            NodeType::Image,
            na::vector![0.0, 0.0],
            na::vector![200.0, 100.0],
        );
        node.set_size(na::vector![300.0, 300.0]);
        node.restore_original_aspect();
        assert_relative_eq!(node.size()[0], 300.0);
        assert_relative_eq!(node.size()[1], 150.0);
        assert_relative_eq!(node.aspect_ratio(), 2.0);
    }

    #[test]
    fn rotated_bounds_grow() {
        let mut node = Node::new(
            NodeType::Image,
            na::vector![0.0, 0.0],
            na::vector![200.0, 100.0],
        );
        node.set_rotation(90.0);
        let bounds = node.bounds();
        assert_relative_eq!(bounds.extents()[0], 100.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.extents()[1], 200.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.center().coords[0], 100.0, epsilon = 1e-9);
    }

    #[test]
    fn resource_hash_only_for_media() {
        let mut image = Node::new(
            NodeType::Image,
            na::vector![0.0, 0.0],
            na::vector![200.0, 200.0],
        );
        image.properties.hash = Some("cafe".to_string());
        assert_eq!(image.resource_hash(), Some("cafe"));

        let mut text = Node::new(
            NodeType::Text,
            na::vector![0.0, 0.0],
            na::vector![200.0, 100.0],
        );
        text.properties.hash = Some("cafe".to_string());
        assert_eq!(text.resource_hash(), None);
    }

    #[test]
    fn unknown_node_type_roundtrip() {
        let parsed: NodeType = serde_json::from_str("\"holo-display\"").unwrap();
        assert_eq!(parsed, NodeType::Unknown);
        let parsed: NodeType = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(parsed, NodeType::Video);
    }
}
