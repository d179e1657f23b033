// Imports
use super::{NodeKey, NodeStore};
use p2d::bounding_volume::Aabb;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename = "selection_component")]
pub struct SelectionComponent {
    #[serde(default, rename = "selected")]
    pub selected: bool,
}

impl Default for SelectionComponent {
    fn default() -> Self {
        Self { selected: false }
    }
}

/// Systems that are related to selecting.
impl NodeStore {
    /// Rebuild the slotmap with empty selection components with the keys returned from the node components.
    pub(crate) fn rebuild_selection_components_slotmap(&mut self) {
        self.selection_components = Arc::new(slotmap::SecondaryMap::new());
        self.node_components.keys().for_each(|key| {
            Arc::make_mut(&mut self.selection_components)
                .insert(key, Arc::new(SelectionComponent::default()));
        });
    }

    pub(crate) fn selected(&self, key: NodeKey) -> Option<bool> {
        self.selection_components
            .get(key)
            .map(|selection_comp| selection_comp.selected)
    }

    /// Set if the node is currently selected.
    pub(crate) fn set_selected(&mut self, key: NodeKey, selected: bool) {
        if let Some(selection_comp) = Arc::make_mut(&mut self.selection_components)
            .get_mut(key)
            .map(Arc::make_mut)
        {
            selection_comp.selected = selected;
        }
    }

    pub(crate) fn set_selected_keys(&mut self, keys: &[NodeKey], selected: bool) {
        keys.iter().for_each(|&key| {
            self.set_selected(key, selected);
        })
    }

    /// Replace the selection with the given keys.
    pub(crate) fn replace_selection(&mut self, keys: &[NodeKey]) {
        let old_selection = self.selection_keys_as_rendered();
        self.set_selected_keys(&old_selection, false);
        self.set_selected_keys(keys, true);
    }

    pub(crate) fn deselect_all(&mut self) {
        let old_selection = self.selection_keys_as_rendered();
        self.set_selected_keys(&old_selection, false);
    }

    /// Return the selection keys in the order that they should be rendered.
    ///
    /// Only returns keys that are currently in the graph, so stale selection entries are
    /// dropped here rather than aborting a gesture.
    pub fn selection_keys_as_rendered(&self) -> Vec<NodeKey> {
        self.z_order
            .iter()
            .copied()
            .filter(|&key| self.selected(key).unwrap_or(false))
            .collect()
    }

    /// Generate the bounds that include all selected nodes.
    ///
    /// None if no nodes are selected.
    pub fn selection_bounds(&self) -> Option<Aabb> {
        self.bounds_for_nodes(&self.selection_keys_as_rendered())
    }

    /// Duplicate the selected keys in place, offset by `offset`.
    ///
    /// The duplicates are appended to the z-order and become the new selection.
    pub(crate) fn duplicate_selection(&mut self, offset: na::Vector2<f64>) -> Vec<NodeKey> {
        let old_selected = self.selection_keys_as_rendered();
        self.set_selected_keys(&old_selected, false);

        let new_selected = old_selected
            .iter()
            .filter_map(|&old_key| {
                let node = (**self.node_components.get(old_key)?).clone();
                let new_key = self.insert_node(node);
                self.set_selected(new_key, true);
                Some(new_key)
            })
            .collect::<Vec<NodeKey>>();

        self.translate_nodes(&new_selected, offset);

        new_selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeType};
    use approx::assert_relative_eq;

    fn new_node(x: f64, y: f64) -> Node {
        Node::new(NodeType::Image, na::vector![x, y], na::vector![200.0, 200.0])
    }

    #[test]
    fn selection_ordered_by_z() {
        let mut store = NodeStore::default();
        let a = store.insert_node(new_node(0.0, 0.0));
        let b = store.insert_node(new_node(10.0, 10.0));
        let c = store.insert_node(new_node(20.0, 20.0));

        store.set_selected(c, true);
        store.set_selected(a, true);
        assert_eq!(store.selection_keys_as_rendered(), vec![a, c]);

        store.replace_selection(&[b]);
        assert_eq!(store.selection_keys_as_rendered(), vec![b]);
    }

    #[test]
    fn stale_selection_keys_dropped() {
        let mut store = NodeStore::default();
        let a = store.insert_node(new_node(0.0, 0.0));
        let b = store.insert_node(new_node(10.0, 10.0));
        store.set_selected_keys(&[a, b], true);

        store.remove_node(a);
        assert_eq!(store.selection_keys_as_rendered(), vec![b]);
    }

    #[test]
    fn duplicate_selection_offsets_and_reselects() {
        let mut store = NodeStore::default();
        let a = store.insert_node(new_node(0.0, 0.0));
        store.set_selected(a, true);

        let duplicated = store.duplicate_selection(na::vector![20.0, 20.0]);
        assert_eq!(duplicated.len(), 1);
        assert_eq!(store.selection_keys_as_rendered(), duplicated);
        assert_eq!(store.node_count(), 2);

        let dup = store.get_node_ref(duplicated[0]).unwrap();
        assert_relative_eq!(dup.pos()[0], 20.0);
        assert_relative_eq!(dup.pos()[1], 20.0);
    }
}
