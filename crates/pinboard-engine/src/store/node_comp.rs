// Imports
use super::{NodeKey, NodeStore};
use crate::node::Node;
use p2d::bounding_volume::{Aabb, BoundingVolume};
use p2d::query::PointQuery;
use pinboard_compose::hittest;
use std::sync::Arc;

/// Systems that are related to the node components and the z-order.
impl NodeStore {
    /// Gets a immutable reference to a node.
    pub fn get_node_ref(&self, key: NodeKey) -> Option<&Node> {
        self.node_components.get(key).map(|node| &**node)
    }

    /// Gets immutable references to the nodes for the given keys.
    pub fn get_nodes_ref(&self, keys: &[NodeKey]) -> Vec<&Node> {
        keys.iter()
            .filter_map(|&key| self.node_components.get(key).map(|node| &**node))
            .collect()
    }

    /// Mutate a node through the given closure, keeping the spatial index in sync.
    pub(crate) fn update_node(&mut self, key: NodeKey, f: impl FnOnce(&mut Node)) {
        if let Some(node) = Arc::make_mut(&mut self.node_components)
            .get_mut(key)
            .map(Arc::make_mut)
        {
            f(node);
            let bounds = node.bounds();
            self.spatial_index.index(key, bounds);
        }
    }

    /// All keys, unordered.
    pub fn keys_unordered(&self) -> Vec<NodeKey> {
        self.node_components.keys().collect()
    }

    /// The node keys in the order that they should be rendered (z-order, bottom first).
    pub fn keys_as_rendered(&self) -> Vec<NodeKey> {
        (*self.z_order).clone()
    }

    /// Node keys intersecting the given bounds, in render order.
    pub fn keys_as_rendered_intersecting_bounds(&self, bounds: Aabb) -> Vec<NodeKey> {
        let intersecting = self.spatial_index.hits(bounds);
        self.z_order
            .iter()
            .copied()
            .filter(|key| intersecting.contains(key))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.z_order.len()
    }

    /// Generate the enclosing bounds for the given keys.
    pub fn bounds_for_nodes(&self, keys: &[NodeKey]) -> Option<Aabb> {
        let mut keys_iter = keys.iter();
        let key = keys_iter.next()?;
        let first = self.node_components.get(*key)?;
        let mut bounds = first.bounds();

        keys_iter
            .filter_map(|&key| self.node_components.get(key))
            .for_each(|node| {
                bounds.merge(&node.bounds());
            });

        Some(bounds)
    }

    /// The enclosing bounds of the whole graph.
    pub fn bounds_all(&self) -> Option<Aabb> {
        self.bounds_for_nodes(&self.keys_as_rendered())
    }

    /// Translate the nodes by the offset.
    pub(crate) fn translate_nodes(&mut self, keys: &[NodeKey], offset: na::Vector2<f64>) {
        keys.iter().for_each(|&key| {
            self.update_node(key, |node| node.translate(offset));
        });
    }

    /// Rigidly rotate the nodes: each center orbits `pivot` by `angle_delta` (degrees) and
    /// each node's own rotation advances by the same delta.
    pub(crate) fn rotate_nodes_rigid(
        &mut self,
        keys: &[NodeKey],
        angle_delta: f64,
        pivot: na::Vector2<f64>,
    ) {
        let angle_rad = angle_delta.to_radians();
        keys.iter().for_each(|&key| {
            self.update_node(key, |node| {
                let new_center = hittest::rotate_about(node.center(), pivot, angle_rad);
                node.set_center(new_center);
                node.set_rotation(node.rotation() + angle_delta);
            });
        });
    }

    /// The topmost node whose body contains the given world coordinate.
    ///
    /// Group boxes never match here, their only opaque region is the title bar.
    pub fn topmost_node_at(&self, pos: na::Vector2<f64>) -> Option<NodeKey> {
        self.z_order.iter().rev().copied().find(|&key| {
            self.get_node_ref(key)
                .map(|node| node.contains_point(pos))
                .unwrap_or(false)
        })
    }

    /// The topmost group box whose title bar contains the given world coordinate.
    pub fn topmost_titlebar_at(&self, pos: na::Vector2<f64>) -> Option<NodeKey> {
        self.z_order.iter().rev().copied().find(|&key| {
            self.get_node_ref(key)
                .map(|node| node.titlebar_contains_point(pos))
                .unwrap_or(false)
        })
    }

    /// The keys of the nodes contained in the given group box: every non-groupbox node
    /// whose center lies within the box bounds. Only returns keys currently in the graph.
    pub fn groupbox_contained_keys(&self, groupbox_key: NodeKey) -> Vec<NodeKey> {
        let Some(groupbox) = self.get_node_ref(groupbox_key) else {
            return Vec::new();
        };
        let bounds = groupbox.bounds();

        self.z_order
            .iter()
            .copied()
            .filter(|&key| {
                key != groupbox_key
                    && self
                        .get_node_ref(key)
                        .map(|node| {
                            !node.flags.groupbox
                                && bounds.contains_local_point(&node.center().into())
                        })
                        .unwrap_or(false)
            })
            .collect()
    }

    /// Move the node one step up within the subset of nodes overlapping it.
    ///
    /// Falls back to a one-step adjacent move when nothing overlaps above.
    pub(crate) fn z_step_forward(&mut self, key: NodeKey) -> bool {
        let Some(bounds) = self.get_node_ref(key).map(|node| node.bounds()) else {
            return false;
        };
        let z_order = Arc::make_mut(&mut self.z_order);
        let Some(idx) = z_order.iter().position(|&k| k == key) else {
            return false;
        };

        let overlapping_above = z_order[idx + 1..]
            .iter()
            .position(|&other| {
                self.node_components
                    .get(other)
                    .map(|node| node.bounds().intersects(&bounds))
                    .unwrap_or(false)
            })
            .map(|p| idx + 1 + p);

        match overlapping_above {
            Some(target) => {
                z_order.remove(idx);
                z_order.insert(target, key);
                true
            }
            None if idx + 1 < z_order.len() => {
                z_order.swap(idx, idx + 1);
                true
            }
            None => false,
        }
    }

    /// Move the node one step down within the subset of nodes overlapping it.
    ///
    /// Falls back to a one-step adjacent move when nothing overlaps below.
    pub(crate) fn z_step_backward(&mut self, key: NodeKey) -> bool {
        let Some(bounds) = self.get_node_ref(key).map(|node| node.bounds()) else {
            return false;
        };
        let z_order = Arc::make_mut(&mut self.z_order);
        let Some(idx) = z_order.iter().position(|&k| k == key) else {
            return false;
        };

        let overlapping_below = z_order[..idx].iter().rposition(|&other| {
            self.node_components
                .get(other)
                .map(|node| node.bounds().intersects(&bounds))
                .unwrap_or(false)
        });

        match overlapping_below {
            Some(target) => {
                z_order.remove(idx);
                z_order.insert(target, key);
                true
            }
            None if idx > 0 => {
                z_order.swap(idx, idx - 1);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    fn new_node_sized(x: f64, y: f64, w: f64, h: f64) -> Node {
        Node::new(NodeType::Image, na::vector![x, y], na::vector![w, h])
    }

    #[test]
    fn z_step_within_overlapping_subset() {
        let mut store = NodeStore::default();
        // a and c overlap, b is far away.
        let a = store.insert_node(new_node_sized(0.0, 0.0, 200.0, 200.0));
        let b = store.insert_node(new_node_sized(1000.0, 0.0, 200.0, 200.0));
        let c = store.insert_node(new_node_sized(100.0, 100.0, 200.0, 200.0));

        // a skips over the non-overlapping b, directly above c.
        assert!(store.z_step_forward(a));
        assert_eq!(store.keys_as_rendered(), vec![b, c, a]);
    }

    #[test]
    fn z_step_adjacent_fallback() {
        let mut store = NodeStore::default();
        let a = store.insert_node(new_node_sized(0.0, 0.0, 200.0, 200.0));
        let b = store.insert_node(new_node_sized(1000.0, 0.0, 200.0, 200.0));

        // Nothing overlaps a, one-step absolute move instead.
        assert!(store.z_step_forward(a));
        assert_eq!(store.keys_as_rendered(), vec![b, a]);
        // Already topmost, no-op.
        assert!(!store.z_step_forward(a));
    }

    #[test]
    fn topmost_hit_respects_z_order() {
        let mut store = NodeStore::default();
        let a = store.insert_node(new_node_sized(0.0, 0.0, 200.0, 200.0));
        let b = store.insert_node(new_node_sized(100.0, 100.0, 200.0, 200.0));

        assert_eq!(store.topmost_node_at(na::vector![150.0, 150.0]), Some(b));
        assert_eq!(store.topmost_node_at(na::vector![50.0, 50.0]), Some(a));
        assert_eq!(store.topmost_node_at(na::vector![500.0, 500.0]), None);
    }

    #[test]
    fn groupbox_contains_by_center() {
        let mut store = NodeStore::default();
        let inside = store.insert_node(new_node_sized(50.0, 50.0, 100.0, 100.0));
        let _outside = store.insert_node(new_node_sized(900.0, 900.0, 100.0, 100.0));
        let groupbox = store.insert_node(Node::new(
            NodeType::GroupBox,
            na::vector![0.0, 0.0],
            na::vector![400.0, 400.0],
        ));

        assert_eq!(store.groupbox_contained_keys(groupbox), vec![inside]);
    }
}
