// Modules
pub mod node_comp;
pub mod selection_comp;
mod spatial;

// Re-exports
pub use selection_comp::SelectionComponent;

// Imports
use crate::node::Node;
use crate::WidgetFlags;
use slotmap::{HopSlotMap, SecondaryMap};
use spatial::SpatialIndex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

slotmap::new_key_type! {
    pub struct NodeKey;
}

/// A recorded state of the node graph.
///
/// Entries share their maps through Arc's; a history entry is cheap until the live state
/// diverges from it through copy-on-write.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub node_components: Arc<HopSlotMap<NodeKey, Arc<Node>>>,
    /// The z-order. Position in this sequence IS the z-order, last is topmost.
    pub z_order: Arc<Vec<NodeKey>>,
}

impl Default for HistoryEntry {
    fn default() -> Self {
        Self {
            node_components: Arc::new(HopSlotMap::with_key()),
            z_order: Arc::new(Vec::new()),
        }
    }
}

/// The node store.
///
/// Follows an entity-component pattern: entities are [NodeKey]'s, the primary component map
/// holds the node geometry and payload, secondary maps hold selection state. The z-order is
/// an explicit sequence of keys; its array position is the z-order (there are no fractional
/// order keys). Systems are implemented as methods, loosely grouped into the submodules.
#[derive(Debug)]
pub struct NodeStore {
    // Components
    node_components: Arc<HopSlotMap<NodeKey, Arc<Node>>>,
    z_order: Arc<Vec<NodeKey>>,
    selection_components: Arc<SecondaryMap<NodeKey, Arc<SelectionComponent>>>,

    history: VecDeque<HistoryEntry>,
    /// The index of the current live state in the history.
    live_index: usize,
    /// Spatial index over the node bounds, for faster culling and marquee queries.
    ///
    /// Kept in sync by the geometry systems; rebuilt wholesale when a snapshot or
    /// history entry is imported.
    spatial_index: SpatialIndex,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self {
            node_components: Arc::new(HopSlotMap::with_key()),
            z_order: Arc::new(Vec::new()),
            selection_components: Arc::new(SecondaryMap::new()),

            // Start off with state in the history
            history: VecDeque::from(vec![HistoryEntry::default()]),
            live_index: 0,

            spatial_index: SpatialIndex::default(),
        }
    }
}

impl NodeStore {
    /// Max length of the history.
    pub(crate) const HISTORY_MAX_LEN: usize = 20;

    /// Replace the whole graph with the given nodes, in z-order. Used when loading a snapshot.
    pub(crate) fn import_nodes(&mut self, nodes: Vec<Node>) -> WidgetFlags {
        let mut widget_flags = self.clear();

        let node_components = Arc::make_mut(&mut self.node_components);
        let z_order = Arc::make_mut(&mut self.z_order);
        let selection_components = Arc::make_mut(&mut self.selection_components);
        for node in nodes {
            let key = node_components.insert(Arc::new(node));
            z_order.push(key);
            selection_components.insert(key, Arc::new(SelectionComponent::default()));
        }

        self.rebuild_spatial_index();
        widget_flags |= self.clear_history(self.create_history_entry());
        widget_flags.redraw = true;
        widget_flags.store_modified = true;
        widget_flags
    }

    /// Rebuild the spatial index from the current node keys and bounds.
    fn rebuild_spatial_index(&mut self) {
        let nodes = self
            .node_components
            .iter()
            .map(|(key, node)| (key, node.bounds()))
            .collect();
        self.spatial_index.rebuild(nodes);
    }

    /// Checks the equality of current state to all fields of the given history entry,
    /// doing pointer compares since they are wrapped inside Arc's.
    fn eq_w_history_entry(&self, history_entry: &HistoryEntry) -> bool {
        Arc::ptr_eq(&self.node_components, &history_entry.node_components)
            && Arc::ptr_eq(&self.z_order, &history_entry.z_order)
    }

    /// Create a history entry from the current state.
    pub(crate) fn create_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            node_components: Arc::clone(&self.node_components),
            z_order: Arc::clone(&self.z_order),
        }
    }

    /// Import the given history entry and replace the current state with it.
    fn import_history_entry(&mut self, history_entry: HistoryEntry) {
        self.node_components = Arc::clone(&history_entry.node_components);
        self.z_order = Arc::clone(&history_entry.z_order);

        // Since we don't store the spatial index or the selection in the history, rebuild them.
        self.rebuild_spatial_index();
        self.rebuild_selection_components_slotmap();
    }

    /// Record the current state and save it in the history.
    pub(crate) fn record(&mut self, _now: Instant) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();

        if self
            .history
            .back()
            .map(|last| !self.eq_w_history_entry(last))
            .unwrap_or(true)
        {
            // as soon as the current state is recorded, remove the future
            self.history.truncate(self.live_index + 1);

            let current = self.create_history_entry();
            self.history.push_back(current);
            self.live_index += 1;

            // truncate history if necessary
            while self.history.len() > Self::HISTORY_MAX_LEN {
                self.history.pop_front();
                self.live_index -= 1;
            }
        } else {
            debug!("State has not changed, no need to record.");
        }

        widget_flags.hide_undo = Some(!self.can_undo());
        widget_flags.hide_redo = Some(!self.can_redo());

        widget_flags
    }

    /// Undo the latest changes.
    ///
    /// Should only be called from inside the engine undo wrapper function.
    pub(crate) fn undo(&mut self, _now: Instant) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();

        if !self.can_undo() {
            return widget_flags;
        }

        let prev = self.history[self.live_index - 1].clone();
        self.import_history_entry(prev);
        self.live_index -= 1;

        widget_flags.hide_undo = Some(!self.can_undo());
        widget_flags.hide_redo = Some(!self.can_redo());
        widget_flags.store_modified = true;
        widget_flags.redraw = true;

        widget_flags
    }

    /// Redo the latest changes.
    ///
    /// Should only be called from inside the engine redo wrapper function.
    pub(crate) fn redo(&mut self, _now: Instant) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();

        if !self.can_redo() {
            return widget_flags;
        }

        let next = self.history[self.live_index + 1].clone();
        self.import_history_entry(next);
        self.live_index += 1;

        widget_flags.hide_undo = Some(!self.can_undo());
        widget_flags.hide_redo = Some(!self.can_redo());
        widget_flags.store_modified = true;
        widget_flags.redraw = true;

        widget_flags
    }

    pub(crate) fn can_undo(&self) -> bool {
        self.live_index > 0
    }

    pub(crate) fn can_redo(&self) -> bool {
        self.live_index < self.history.len() - 1
    }

    /// Clear the history.
    pub(crate) fn clear_history(&mut self, initial_state: HistoryEntry) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();

        self.history = VecDeque::from(vec![initial_state]);
        self.live_index = 0;

        widget_flags.hide_undo = Some(true);
        widget_flags.hide_redo = Some(true);

        widget_flags
    }

    /// The undo history, oldest first, up to and including the live state.
    ///
    /// Used when persisting the undo stack.
    pub(crate) fn history_up_to_live(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter().take(self.live_index + 1)
    }

    /// Replace the history with persisted entries. The last entry becomes the live state.
    pub(crate) fn restore_history(&mut self, entries: Vec<HistoryEntry>) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        let Some(last) = entries.last().cloned() else {
            return widget_flags;
        };

        self.import_history_entry(last);
        self.live_index = entries.len() - 1;
        self.history = VecDeque::from(entries);

        widget_flags.hide_undo = Some(!self.can_undo());
        widget_flags.hide_redo = Some(!self.can_redo());
        widget_flags.store_modified = true;
        widget_flags.redraw = true;
        widget_flags
    }

    /// Insert a new node into the store, appending it to the top of the z-order.
    pub(crate) fn insert_node(&mut self, node: Node) -> NodeKey {
        let bounds = node.bounds();
        let key = Arc::make_mut(&mut self.node_components).insert(Arc::new(node));
        Arc::make_mut(&mut self.z_order).push(key);
        Arc::make_mut(&mut self.selection_components)
            .insert(key, Arc::new(SelectionComponent::default()));
        self.spatial_index.index(key, bounds);

        key
    }

    /// Permanently remove a node with the given key from the store, splicing the z-order.
    pub(crate) fn remove_node(&mut self, key: NodeKey) -> Option<Node> {
        Arc::make_mut(&mut self.selection_components).remove(key);
        Arc::make_mut(&mut self.z_order).retain(|&k| k != key);
        self.spatial_index.remove(key);
        Arc::make_mut(&mut self.node_components)
            .remove(key)
            .map(|node| (*node).clone())
    }

    /// Clears the entire store.
    pub(crate) fn clear(&mut self) -> WidgetFlags {
        Arc::make_mut(&mut self.node_components).clear();
        Arc::make_mut(&mut self.z_order).clear();
        Arc::make_mut(&mut self.selection_components).clear();

        let widget_flags = self.clear_history(HistoryEntry::default());
        self.spatial_index.clear();

        widget_flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    fn new_node(x: f64, y: f64) -> Node {
        Node::new(NodeType::Image, na::vector![x, y], na::vector![200.0, 200.0])
    }

    #[test]
    fn undo_restores_z_order_position() {
        let mut store = NodeStore::default();
        let now = Instant::now();

        let a = store.insert_node(new_node(0.0, 0.0));
        let b = store.insert_node(new_node(10.0, 0.0));
        let c = store.insert_node(new_node(20.0, 0.0));
        let _ = store.record(now);

        store.remove_node(b);
        let _ = store.record(now);
        assert_eq!(store.keys_as_rendered(), vec![a, c]);

        let _ = store.undo(now);
        assert_eq!(store.keys_as_rendered(), vec![a, b, c]);
    }

    #[test]
    fn record_skips_unchanged_state() {
        let mut store = NodeStore::default();
        let now = Instant::now();

        store.insert_node(new_node(0.0, 0.0));
        let _ = store.record(now);
        assert!(store.can_undo());

        // Nothing changed in between, the second record must not add an entry.
        let _ = store.record(now);
        let _ = store.undo(now);
        assert!(!store.can_undo());
    }

    #[test]
    fn redo_cleared_on_new_commit() {
        let mut store = NodeStore::default();
        let now = Instant::now();

        store.insert_node(new_node(0.0, 0.0));
        let _ = store.record(now);
        let _ = store.undo(now);
        assert!(store.can_redo());

        store.insert_node(new_node(50.0, 50.0));
        let _ = store.record(now);
        assert!(!store.can_redo());
    }

    #[test]
    fn history_bounded() {
        let mut store = NodeStore::default();
        let now = Instant::now();

        for i in 0..(NodeStore::HISTORY_MAX_LEN * 2) {
            store.insert_node(new_node(i as f64, 0.0));
            let _ = store.record(now);
        }

        let mut undo_steps = 0;
        while store.can_undo() {
            let _ = store.undo(now);
            undo_steps += 1;
        }
        assert_eq!(undo_steps, NodeStore::HISTORY_MAX_LEN - 1);
    }
}
