// Imports
use crate::node::{Node, NodeFlags, NodeProperties, NodeType};
use crate::store::{HistoryEntry, NodeStore};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A serialized record of one node, as it appears in persisted snapshots.
///
/// Image and video nodes only keep `{ hash, filename }` of their payload so snapshots stay
/// bounded no matter how large the referenced resources are.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename = "node_record")]
pub struct NodeRecord {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(rename = "pos")]
    pub pos: [f64; 2],
    #[serde(rename = "size")]
    pub size: [f64; 2],
    #[serde(rename = "aspectRatio")]
    pub aspect_ratio: f64,
    #[serde(rename = "rotation")]
    pub rotation: f64,
    #[serde(rename = "properties")]
    pub properties: NodeProperties,
    #[serde(rename = "flags")]
    pub flags: NodeFlags,
    #[serde(rename = "title", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Default for NodeRecord {
    fn default() -> Self {
        Self {
            node_type: NodeType::Image,
            pos: [0.0, 0.0],
            size: [Node::MIN_NODE_EXTENT, Node::MIN_NODE_EXTENT],
            aspect_ratio: 1.0,
            rotation: 0.0,
            properties: NodeProperties::default(),
            flags: NodeFlags::default(),
            title: None,
        }
    }
}

impl NodeRecord {
    pub fn from_node(node: &Node) -> Self {
        let properties = if node.node_type.is_media() {
            NodeProperties {
                hash: node.properties.hash.clone(),
                filename: node.properties.filename.clone(),
                ..NodeProperties::default()
            }
        } else {
            node.properties.clone()
        };

        Self {
            node_type: node.node_type,
            pos: [node.pos()[0], node.pos()[1]],
            size: [node.size()[0], node.size()[1]],
            aspect_ratio: node.aspect_ratio(),
            rotation: node.rotation(),
            properties,
            flags: node.flags,
            title: if node.title.is_empty() {
                None
            } else {
                Some(node.title.clone())
            },
        }
    }

    /// Rebuild a node from the record.
    ///
    /// Returns None for unknown types and for records with degenerate geometry; callers are
    /// expected to skip those rather than failing the whole load.
    pub fn into_node(self) -> Option<Node> {
        if self.node_type == NodeType::Unknown {
            warn!("Skipping node record with unknown type.");
            return None;
        }
        let finite = self.pos.iter().chain(self.size.iter()).all(|v| v.is_finite());
        if !finite || self.size[0] <= 0.0 || self.size[1] <= 0.0 {
            warn!(
                "Skipping node record with degenerate geometry, pos: {:?}, size: {:?}.",
                self.pos, self.size
            );
            return None;
        }

        let mut node = Node::new(
            self.node_type,
            na::vector![self.pos[0], self.pos[1]],
            na::vector![self.size[0], self.size[1]],
        );
        node.set_rotation(self.rotation);
        node.properties = self.properties;
        node.flags = NodeFlags {
            groupbox: self.node_type == NodeType::GroupBox,
            ..self.flags
        };
        node.title = self.title.unwrap_or_default();

        Some(node)
    }
}

/// A canvas snapshot: the persisted form of the node graph, in z-order.
///
/// The viewport is deliberately not part of it; undo must not teleport the camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename = "canvas_snapshot")]
pub struct CanvasSnapshot {
    #[serde(rename = "version")]
    pub version: u32,
    #[serde(rename = "nodes")]
    pub nodes: Vec<NodeRecord>,
}

impl Default for CanvasSnapshot {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            nodes: Vec::new(),
        }
    }
}

impl CanvasSnapshot {
    /// The current snapshot schema version. The schema is append-only-compatible.
    pub const VERSION: u32 = 1;

    pub fn from_store(store: &NodeStore) -> Self {
        Self {
            version: Self::VERSION,
            nodes: store
                .keys_as_rendered()
                .into_iter()
                .filter_map(|key| store.get_node_ref(key).map(NodeRecord::from_node))
                .collect(),
        }
    }

    pub(crate) fn from_history_entry(entry: &HistoryEntry) -> Self {
        Self {
            version: Self::VERSION,
            nodes: entry
                .z_order
                .iter()
                .filter_map(|&key| {
                    entry
                        .node_components
                        .get(key)
                        .map(|node| NodeRecord::from_node(node))
                })
                .collect(),
        }
    }

    /// Rebuild the nodes in z-order, skipping records that cannot be restored.
    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
            .into_iter()
            .filter_map(NodeRecord::into_node)
            .collect()
    }
}

/// The persisted form of the undo history, oldest entry first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename = "undo_stack_record")]
pub struct UndoStackRecord {
    #[serde(rename = "entries")]
    pub entries: Vec<CanvasSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn media_payload_reduced_to_hash_and_filename() {
        let mut node = Node::new(
            NodeType::Image,
            na::vector![0.0, 0.0],
            na::vector![200.0, 100.0],
        );
        node.properties.hash = Some("abc123".to_string());
        node.properties.filename = Some("cat.png".to_string());
        node.properties
            .extra
            .insert("blob".to_string(), serde_json::json!([0, 1, 2, 3]));

        let record = NodeRecord::from_node(&node);
        assert_eq!(record.properties.hash.as_deref(), Some("abc123"));
        assert_eq!(record.properties.filename.as_deref(), Some("cat.png"));
        assert!(record.properties.extra.is_empty());
    }

    #[test]
    fn snapshot_roundtrip_preserves_geometry() {
        let mut node = Node::new(
            NodeType::Text,
            na::vector![12.5, -4.0],
            na::vector![300.0, 150.0],
        );
        node.set_rotation(33.0);
        node.properties.text = Some("hello".to_string());
        node.title = "note".to_string();

        let json = serde_json::to_string(&NodeRecord::from_node(&node)).unwrap();
        let record: NodeRecord = serde_json::from_str(&json).unwrap();
        let restored = record.into_node().unwrap();

        assert_relative_eq!(restored.pos()[0], 12.5);
        assert_relative_eq!(restored.pos()[1], -4.0);
        assert_relative_eq!(restored.size()[0], 300.0);
        assert_relative_eq!(restored.rotation(), 33.0);
        assert_relative_eq!(restored.aspect_ratio(), 2.0);
        assert_eq!(restored.title, "note");
        assert_eq!(restored.properties.text.as_deref(), Some("hello"));
    }

    #[test]
    fn unknown_type_records_are_skipped() {
        let json = r#"{
            "version": 1,
            "nodes": [
                { "type": "image", "pos": [0.0, 0.0], "size": [100.0, 100.0] },
                { "type": "hologram", "pos": [50.0, 0.0], "size": [100.0, 100.0] },
                { "type": "text", "pos": [0.0, 50.0], "size": [100.0, 100.0] }
            ]
        }"#;

        let snapshot: CanvasSnapshot = serde_json::from_str(json).unwrap();
        let nodes = snapshot.into_nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].node_type, NodeType::Image);
        assert_eq!(nodes[1].node_type, NodeType::Text);
    }

    #[test]
    fn degenerate_geometry_records_are_skipped() {
        let record = NodeRecord {
            pos: [f64::NAN, 0.0],
            ..NodeRecord::default()
        };
        assert!(record.into_node().is_none());

        let record = NodeRecord {
            size: [0.0, 100.0],
            ..NodeRecord::default()
        };
        assert!(record.into_node().is_none());
    }
}
